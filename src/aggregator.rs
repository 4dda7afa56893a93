//! Shared record store with structural deduplication.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Mutex;

use crate::Record;

#[derive(Debug, Default)]
struct Inner {
    records: Vec<Record>,
    seen: HashSet<Record>,
}

impl Inner {
    fn push(&mut self, record: Record) -> bool {
        if self.seen.contains(&record) {
            return false;
        }
        self.seen.insert(record.clone());
        self.records.push(record);
        true
    }
}

/// Append-only collection of records shared by every worker of a run.
///
/// Records are kept in completion order and no two stored records are
/// structurally equal. The size can be read without taking the lock.
#[derive(Debug, Default)]
pub struct AggregationStore {
    inner: Mutex<Inner>,
    size: AtomicUsize,
}

impl AggregationStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record unless an equal one is already stored.
    ///
    /// Returns whether the record was inserted.
    pub async fn append(&self, record: Record) -> bool {
        let mut inner = self.inner.lock().await;
        let inserted = inner.push(record);
        if inserted {
            self.size.fetch_add(1, Ordering::Release);
        }
        inserted
    }

    /// Appends several records under one lock acquisition.
    ///
    /// Returns how many were inserted.
    pub async fn append_all(&self, records: impl IntoIterator<Item = Record>) -> usize {
        let mut inner = self.inner.lock().await;
        let mut inserted = 0;
        for record in records {
            if inner.push(record) {
                inserted += 1;
            }
        }
        self.size.fetch_add(inserted, Ordering::Release);
        inserted
    }

    /// Number of stored records.
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    /// Copy of the stored records in completion order.
    pub async fn snapshot(&self) -> Vec<Record> {
        self.inner.lock().await.records.clone()
    }

    /// Consumes the store, returning its records.
    pub fn into_records(self) -> Vec<Record> {
        self.inner.into_inner().records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn record(url: &str) -> Record {
        Record::new().with("url", url)
    }

    #[tokio::test]
    async fn test_append_and_snapshot_order() {
        let store = AggregationStore::new();
        assert!(store.append(record("b")).await);
        assert!(store.append(record("a")).await);
        assert_eq!(store.size(), 2);

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot[0].text("url"), Some("b"));
        assert_eq!(snapshot[1].text("url"), Some("a"));
    }

    #[tokio::test]
    async fn test_append_is_idempotent() {
        let store = AggregationStore::new();
        assert!(store.append(record("a")).await);
        assert!(!store.append(record("a")).await);
        assert_eq!(store.size(), 1);
    }

    #[tokio::test]
    async fn test_dedup_ignores_field_order() {
        let store = AggregationStore::new();
        let first = Record::new().with("team", "NAVI").with("rank", "1");
        let second = Record::new().with("rank", "1").with("team", "NAVI");
        assert!(store.append(first).await);
        assert!(!store.append(second).await);
    }

    #[tokio::test]
    async fn test_absent_differs_from_empty_text() {
        let store = AggregationStore::new();
        assert!(store.append(Record::new().with_absent("score")).await);
        assert!(store.append(Record::new().with("score", "")).await);
        assert_eq!(store.size(), 2);
    }

    #[tokio::test]
    async fn test_append_all_counts_inserted() {
        let store = AggregationStore::new();
        store.append(record("a")).await;
        let inserted = store
            .append_all(vec![record("a"), record("b"), record("b"), record("c")])
            .await;
        assert_eq!(inserted, 2);
        assert_eq!(store.size(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_appends() {
        let store = Arc::new(AggregationStore::new());
        let mut handles = Vec::new();
        for worker in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                for i in 0..50 {
                    // Every worker also races on the shared "common" records.
                    store.append(record(&format!("w{}-{}", worker, i))).await;
                    store.append(record(&format!("common-{}", i))).await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.size(), 8 * 50 + 50);
        assert_eq!(store.snapshot().await.len(), store.size());
    }

    #[test]
    fn test_into_records() {
        let store = AggregationStore::new();
        tokio_test::block_on(store.append(record("a")));
        assert_eq!(store.into_records().len(), 1);
    }
}
