use serde::{Deserialize, Serialize};

/// A key/value row in a [`MemoryStore`](crate::store::MemoryStore).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub key: String,
    pub value: String,
}

impl Record {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Generates `count` records with distinct keys under `prefix`.
    ///
    /// Used by the demo workloads and tests to produce database contents of a given size.
    pub fn batch(prefix: &str, count: usize) -> Vec<Record> {
        (0..count)
            .map(|i| Record::new(format!("{prefix}-{i:06}"), format!("value of {prefix} #{i}")))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_keys_are_distinct() {
        let records = Record::batch("perf", 100);
        let mut keys: Vec<_> = records.iter().map(|r| r.key.as_str()).collect();
        keys.dedup();
        assert_eq!(keys.len(), 100);
        assert_eq!(records[7].key, "perf-000007");
    }
}
