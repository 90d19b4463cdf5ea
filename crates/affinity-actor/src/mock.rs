//! # Mock Resource & Testing Guide
//!
//! [`MockResource`] is an in-memory [`ThreadConfined`] resource for tests. It behaves like a
//! tiny transactional log of integers and records everything the actor does to it in a
//! shared [`Probe`], so tests can assert on lifecycle (how many opens, on which thread, how
//! many refreshes, closes and rollbacks) instead of guessing from timing.
//!
//! ## Why a Probe?
//!
//! The resource itself lives on the worker thread and is `!Send`; the test cannot hold it.
//! The probe is the resource's configuration (`Config = Arc<Probe>`), so it is shared by
//! every instance opened with it and stays readable from the test thread. Instances opened
//! with the same probe also share the probe's committed log, which is how two actors on one
//! "file" see each other's commits after a refresh.
//!
//! ## Semantics
//!
//! | Call | Outside a transaction | Inside a transaction |
//! |------|-----------------------|----------------------|
//! | `push(v)` | commits immediately | buffered until commit |
//! | `values()` | this handle's snapshot | snapshot + buffered |
//! | `refresh()` | snapshot := committed log | snapshot := committed log |
//!
//! Every call checks that it runs on the thread that opened the instance.
//!
//! ## Failure Injection
//!
//! ```rust
//! use affinity_actor::mock::{MockResource, Probe};
//! use affinity_actor::{AffinityActor, AffinityError};
//!
//! let probe = Probe::new("broken");
//! probe.fail_open(true);
//! let actor = AffinityActor::<MockResource>::new("broken.db".to_string(), probe.clone());
//!
//! let result = actor.invoke(|db: &mut MockResource| db.push(1));
//! assert!(matches!(result, Err(AffinityError::ResourceOpen(_))));
//! assert_eq!(probe.opened(), 0);
//! ```

use crate::resource::ThreadConfined;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

/// Errors raised by [`MockResource`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MockError {
    #[error("injected open failure")]
    OpenFailed,
    #[error("injected refresh failure")]
    RefreshFailed,
    #[error("injected begin failure")]
    BeginFailed,
    #[error("accessed from {actual:?}, owned by {owner:?}")]
    WrongThread { owner: ThreadId, actual: ThreadId },
    #[error("a transaction is already open")]
    TransactionAlreadyOpen,
    #[error("no transaction is open")]
    NoTransaction,
    #[error("rejected: {0}")]
    Rejected(String),
}

/// Shared observation point and backing store for [`MockResource`] instances.
#[derive(Debug, Default)]
pub struct Probe {
    name: String,
    fail_open: AtomicBool,
    fail_refresh: AtomicBool,
    fail_begin: AtomicBool,
    opened: AtomicUsize,
    closed: AtomicUsize,
    refreshed: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    threads: Mutex<Vec<ThreadId>>,
    committed: Mutex<Vec<i64>>,
}

// Probes are identified by name, like files by path.
impl PartialEq for Probe {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Probe {}

impl Hash for Probe {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl Probe {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            ..Self::default()
        })
    }

    pub fn fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    pub fn fail_refresh(&self, fail: bool) {
        self.fail_refresh.store(fail, Ordering::SeqCst);
    }

    pub fn fail_begin(&self, fail: bool) {
        self.fail_begin.store(fail, Ordering::SeqCst);
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn refreshed(&self) -> usize {
        self.refreshed.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }

    /// Threads that opened an instance, in order.
    pub fn threads(&self) -> Vec<ThreadId> {
        lock(&self.threads).clone()
    }

    /// The committed log, as another instance would see it after a refresh.
    pub fn committed(&self) -> Vec<i64> {
        lock(&self.committed).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// An in-memory thread-confined resource. See the [module docs](self).
#[derive(Debug)]
pub struct MockResource {
    probe: Arc<Probe>,
    owner: ThreadId,
    snapshot: Vec<i64>,
    pending: Option<Vec<i64>>,
    _confined: PhantomData<Rc<()>>,
}

impl MockResource {
    fn check_thread(&self) -> Result<(), MockError> {
        let actual = thread::current().id();
        if actual == self.owner {
            Ok(())
        } else {
            Err(MockError::WrongThread {
                owner: self.owner,
                actual,
            })
        }
    }

    pub fn push(&mut self, value: i64) -> Result<(), MockError> {
        self.check_thread()?;
        match &mut self.pending {
            Some(pending) => pending.push(value),
            None => {
                let mut committed = lock(&self.probe.committed);
                committed.push(value);
                self.snapshot = committed.clone();
            }
        }
        Ok(())
    }

    /// Fails with [`MockError::Rejected`]; handy for error propagation tests.
    pub fn reject(&mut self, reason: &str) -> Result<(), MockError> {
        self.check_thread()?;
        Err(MockError::Rejected(reason.to_string()))
    }

    pub fn values(&self) -> Vec<i64> {
        let mut values = self.snapshot.clone();
        if let Some(pending) = &self.pending {
            values.extend_from_slice(pending);
        }
        values
    }

    pub fn in_transaction(&self) -> bool {
        self.pending.is_some()
    }

    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    pub fn probe(&self) -> &Probe {
        &self.probe
    }
}

impl ThreadConfined for MockResource {
    type Identity = String;
    type Config = Arc<Probe>;
    type Error = MockError;

    fn open(_identity: &String, probe: &Arc<Probe>) -> Result<Self, MockError> {
        if probe.fail_open.load(Ordering::SeqCst) {
            return Err(MockError::OpenFailed);
        }
        let owner = thread::current().id();
        probe.opened.fetch_add(1, Ordering::SeqCst);
        lock(&probe.threads).push(owner);
        Ok(Self {
            probe: probe.clone(),
            owner,
            snapshot: probe.committed(),
            pending: None,
            _confined: PhantomData,
        })
    }

    fn refresh(&mut self) -> Result<(), MockError> {
        self.check_thread()?;
        if self.probe.fail_refresh.load(Ordering::SeqCst) {
            return Err(MockError::RefreshFailed);
        }
        self.probe.refreshed.fetch_add(1, Ordering::SeqCst);
        self.snapshot = self.probe.committed();
        Ok(())
    }

    fn begin_transaction(&mut self) -> Result<(), MockError> {
        self.check_thread()?;
        if self.pending.is_some() {
            return Err(MockError::TransactionAlreadyOpen);
        }
        if self.probe.fail_begin.load(Ordering::SeqCst) {
            return Err(MockError::BeginFailed);
        }
        self.pending = Some(Vec::new());
        Ok(())
    }

    fn commit_transaction(&mut self) -> Result<(), MockError> {
        self.check_thread()?;
        let pending = self.pending.take().ok_or(MockError::NoTransaction)?;
        let mut committed = lock(&self.probe.committed);
        committed.extend(pending);
        self.snapshot = committed.clone();
        self.probe.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn rollback_transaction(&mut self) -> Result<(), MockError> {
        self.check_thread()?;
        self.pending.take().ok_or(MockError::NoTransaction)?;
        self.probe.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(self) -> Result<(), MockError> {
        self.check_thread()?;
        self.probe.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
