//! # Instance Registry
//!
//! A reference-counted cache of [`AffinityActor`]s keyed by resource identity plus the
//! resource configuration. Independent owners asking for the same key get
//! the same actor, and therefore the same worker thread and the same resource instance.
//!
//! The registry is an ordinary value rather than a process-wide static: create one per
//! resource type (or per subsystem) and drop it when done. Its lock covers lookups and
//! refcount updates only, never resource work.
//!
//! ## Teardown
//!
//! When the last [`ActorHandle`] for a key is released the entry is removed and the actor is
//! disposed on a separate reaper thread, so the releasing caller does not pay for draining.
//! If the same key is requested again while that teardown is still running, the new actor's
//! worker waits for it before opening the resource: one key never has two live resource
//! instances.

use crate::actor::AffinityActor;
use crate::mailbox::ShutdownMode;
use crate::options::ActorOptions;
use crate::resource::ThreadConfined;
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

// The whole config, not a digest of it: configs that merely hash alike never share an actor.
type Key<R> = (<R as ThreadConfined>::Identity, <R as ThreadConfined>::Config);

struct Entry<R: ThreadConfined> {
    actor: Arc<AffinityActor<R>>,
    ref_count: usize,
}

struct Tables<R: ThreadConfined> {
    live: HashMap<Key<R>, Entry<R>>,
    retiring: HashMap<Key<R>, JoinHandle<()>>,
}

struct Shared<R: ThreadConfined> {
    tables: Mutex<Tables<R>>,
    options: ActorOptions,
}

/// Shares one [`AffinityActor`] per resource identity and configuration.
///
/// ```rust
/// use affinity_actor::mock::{MockResource, Probe};
/// use affinity_actor::Registry;
///
/// let registry = Registry::<MockResource>::new();
/// let probe = Probe::new("shared");
///
/// let a = registry.get_instance("shared.db".to_string(), probe.clone());
/// let b = registry.get_instance("shared.db".to_string(), probe.clone());
/// assert!(a.same_actor(&b));
/// assert_eq!(registry.ref_count(&"shared.db".to_string(), &probe), 2);
///
/// drop(a);
/// b.release();
/// registry.join_retired();
/// assert!(registry.is_empty());
/// ```
pub struct Registry<R: ThreadConfined> {
    shared: Arc<Shared<R>>,
}

impl<R: ThreadConfined> Clone for Registry<R> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<R: ThreadConfined> Default for Registry<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: ThreadConfined> Registry<R> {
    pub fn new() -> Self {
        Self::with_options(ActorOptions::default())
    }

    /// Registry whose actors are all created with `options`.
    pub fn with_options(options: ActorOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                tables: Mutex::new(Tables {
                    live: HashMap::new(),
                    retiring: HashMap::new(),
                }),
                options,
            }),
        }
    }

    /// Returns the actor for `identity` and `config`, creating it on first use.
    ///
    /// Every call adds one reference; release it by dropping the handle or calling
    /// [`ActorHandle::release`].
    pub fn get_instance(&self, identity: R::Identity, config: R::Config) -> ActorHandle<R> {
        let key = (identity, config);
        let mut tables = self.shared.lock();
        tables.retiring.retain(|_, teardown| !teardown.is_finished());

        let actor = match tables.live.get_mut(&key) {
            Some(entry) => {
                entry.ref_count += 1;
                debug!(identity = %key.0, ref_count = entry.ref_count, "Actor shared");
                entry.actor.clone()
            }
            None => {
                let predecessor = tables.retiring.remove(&key);
                let actor = Arc::new(
                    AffinityActor::with_options(
                        key.0.clone(),
                        key.1.clone(),
                        self.shared.options.clone(),
                    )
                        .after(predecessor),
                );
                tables.live.insert(
                    key.clone(),
                    Entry {
                        actor: actor.clone(),
                        ref_count: 1,
                    },
                );
                info!(identity = %key.0, live = tables.live.len(), "Actor registered");
                actor
            }
        };
        drop(tables);

        ActorHandle {
            actor,
            shared: self.shared.clone(),
            key,
            released: false,
        }
    }

    /// Current number of handles for the key, 0 if it is not registered.
    pub fn ref_count(&self, identity: &R::Identity, config: &R::Config) -> usize {
        let key = (identity.clone(), config.clone());
        self.shared
            .lock()
            .live
            .get(&key)
            .map_or(0, |entry| entry.ref_count)
    }

    /// Number of live (registered) actors.
    pub fn len(&self) -> usize {
        self.shared.lock().live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Blocks until every actor released so far has finished tearing down.
    pub fn join_retired(&self) {
        let retiring: Vec<_> = self.shared.lock().retiring.drain().collect();
        for ((identity, _), teardown) in retiring {
            if teardown.join().is_err() {
                warn!(identity = %identity, "Actor teardown panicked");
            }
        }
    }
}

impl<R: ThreadConfined> Shared<R> {
    fn lock(&self) -> MutexGuard<'_, Tables<R>> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn acquire(&self, key: &Key<R>) {
        if let Some(entry) = self.lock().live.get_mut(key) {
            entry.ref_count += 1;
        }
    }

    fn release(&self, key: &Key<R>, mode: ShutdownMode) {
        let mut tables = self.lock();
        let Some(entry) = tables.live.get_mut(key) else {
            warn!(identity = %key.0, "Release of unregistered actor");
            return;
        };
        entry.ref_count -= 1;
        if entry.ref_count > 0 {
            debug!(identity = %key.0, ref_count = entry.ref_count, "Actor released");
            return;
        }
        let Some(Entry { actor, .. }) = tables.live.remove(key) else {
            return;
        };
        info!(identity = %key.0, ?mode, "Last reference released, disposing");

        let reaper = actor.clone();
        let spawned = thread::Builder::new()
            .name(format!("affinity-release-{}", key.0))
            .spawn(move || reaper.shutdown(mode));
        match spawned {
            Ok(teardown) => {
                tables.retiring.insert(key.clone(), teardown);
            }
            Err(e) => {
                drop(tables);
                warn!(identity = %key.0, error = %e, "Reaper thread unavailable, disposing inline");
                actor.shutdown(mode);
            }
        }
    }
}

/// One counted reference to a registered actor. Derefs to the shared [`AffinityActor`].
///
/// Dropping the handle releases the reference, and so do [`dispose`](Self::dispose) and
/// [`shutdown`](Self::shutdown): through a handle they only tear the actor down when the
/// last reference goes, never from under the other owners.
pub struct ActorHandle<R: ThreadConfined> {
    actor: Arc<AffinityActor<R>>,
    shared: Arc<Shared<R>>,
    key: Key<R>,
    released: bool,
}

impl<R: ThreadConfined> ActorHandle<R> {
    /// Gives up this reference. The actor is disposed when the last one goes.
    pub fn release(mut self) {
        self.release_once(ShutdownMode::Drain);
    }

    /// Same as [`release`](Self::release).
    pub fn dispose(self) {
        self.release();
    }

    /// Releases this reference. If it was the last one, the actor is stopped with `mode`.
    pub fn shutdown(mut self, mode: ShutdownMode) {
        self.release_once(mode);
    }

    fn release_once(&mut self, mode: ShutdownMode) {
        if !self.released {
            self.released = true;
            self.shared.release(&self.key, mode);
        }
    }

    /// Whether both handles refer to the same actor instance.
    pub fn same_actor(&self, other: &ActorHandle<R>) -> bool {
        Arc::ptr_eq(&self.actor, &other.actor)
    }
}

impl<R: ThreadConfined> Clone for ActorHandle<R> {
    fn clone(&self) -> Self {
        self.shared.acquire(&self.key);
        Self {
            actor: self.actor.clone(),
            shared: self.shared.clone(),
            key: self.key.clone(),
            released: false,
        }
    }
}

impl<R: ThreadConfined> Deref for ActorHandle<R> {
    type Target = AffinityActor<R>;

    fn deref(&self) -> &Self::Target {
        &self.actor
    }
}

impl<R: ThreadConfined> Drop for ActorHandle<R> {
    fn drop(&mut self) {
        self.release_once(ShutdownMode::Drain);
    }
}
