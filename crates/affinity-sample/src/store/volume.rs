use crate::model::Record;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// The committed contents behind one or more [`MemoryStore`](super::MemoryStore) handles.
///
/// Plays the role of the database file: every store opened on the same volume sees the
/// same committed data, each through its own snapshot. Equality and hashing are by
/// identity of the shared backing, not by contents.
#[derive(Clone, Default)]
pub struct Volume {
    inner: Arc<Mutex<Committed>>,
}

#[derive(Default)]
struct Committed {
    records: BTreeMap<String, Record>,
    // history[n] holds the changes that produced version n + 1.
    history: Vec<Vec<Change>>,
}

#[derive(Clone)]
pub(crate) enum Change {
    Put(Record),
    Clear,
}

impl Change {
    pub(crate) fn apply(self, records: &mut BTreeMap<String, Record>) {
        match self {
            Change::Put(record) => {
                records.insert(record.key.clone(), record);
            }
            Change::Clear => records.clear(),
        }
    }
}

impl Volume {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed records.
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Incremented by every commit.
    pub fn version(&self) -> u64 {
        self.lock().history.len() as u64
    }

    pub(crate) fn snapshot(&self) -> (BTreeMap<String, Record>, u64) {
        let committed = self.lock();
        (committed.records.clone(), committed.history.len() as u64)
    }

    /// Changes committed after `version`, and the version they lead to.
    pub(crate) fn changes_since(&self, version: u64) -> (Vec<Change>, u64) {
        let committed = self.lock();
        let start = (version as usize).min(committed.history.len());
        let changes = committed.history[start..].iter().flatten().cloned().collect();
        (changes, committed.history.len() as u64)
    }

    /// Applies `changes` atomically and returns the new version.
    pub(crate) fn commit(&self, changes: Vec<Change>) -> u64 {
        let mut committed = self.lock();
        for change in changes.iter().cloned() {
            change.apply(&mut committed.records);
        }
        committed.history.push(changes);
        committed.history.len() as u64
    }

    fn lock(&self) -> MutexGuard<'_, Committed> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PartialEq for Volume {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Volume {}

impl Hash for Volume {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Arc::as_ptr(&self.inner), state);
    }
}

impl fmt::Debug for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let committed = self.lock();
        f.debug_struct("Volume")
            .field("records", &committed.records.len())
            .field("version", &committed.history.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(volume: &Volume) -> u64 {
        let mut hasher = DefaultHasher::new();
        volume.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_clones_share_identity() {
        let a = Volume::new();
        let b = a.clone();
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_ne!(a, Volume::new());
    }

    #[test]
    fn test_changes_since_replays_later_commits() {
        let volume = Volume::new();
        volume.commit(vec![Change::Put(Record::new("a", "1"))]);
        let (mut records, version) = volume.snapshot();
        volume.commit(vec![Change::Put(Record::new("b", "2"))]);

        let (changes, latest) = volume.changes_since(version);
        assert_eq!(latest, 2);
        for change in changes {
            change.apply(&mut records);
        }
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_commit_applies_changes_in_order() {
        let volume = Volume::new();
        volume.commit(vec![Change::Put(Record::new("a", "1"))]);
        let version = volume.commit(vec![Change::Clear, Change::Put(Record::new("b", "2"))]);
        assert_eq!(version, 2);
        let (records, _) = volume.snapshot();
        assert_eq!(records.keys().collect::<Vec<_>>(), vec!["b"]);
    }
}
