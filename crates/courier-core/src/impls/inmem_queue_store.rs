//! In-memory QueueStore.
//!
//! One `tokio::sync::Mutex` guards all records, which makes every operation,
//! and in particular `find_one_and_update`, a single atomic step.

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::RecordId;
use crate::ports::{QueueStore, RecordFilter, RecordUpdate, StoreError};
use crate::queue::QueueRecord;

struct StoredRecord<P> {
    /// Insertion sequence; last tie-breaker so equal priority and equal
    /// `created` still come out in arrival order.
    seq: u64,
    record: QueueRecord<P>,
}

struct InMemoryQueueState<P> {
    records: HashMap<RecordId, StoredRecord<P>>,
    next_seq: u64,
}

impl<P> InMemoryQueueState<P> {
    fn new() -> Self {
        Self {
            records: HashMap::new(),
            next_seq: 0,
        }
    }

    fn allocate_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// First matching record in dequeue order.
    fn first_match(&self, filter: &RecordFilter) -> Option<RecordId> {
        self.records
            .iter()
            .filter(|(_, stored)| filter.matches(&stored.record))
            .min_by(|(_, a), (_, b)| dequeue_order(a, b))
            .map(|(id, _)| *id)
    }
}

fn dequeue_order<P>(a: &StoredRecord<P>, b: &StoredRecord<P>) -> Ordering {
    a.record
        .priority
        .total_cmp(&b.record.priority)
        .then_with(|| a.record.created.cmp(&b.record.created))
        .then_with(|| a.seq.cmp(&b.seq))
}

fn require_id<P>(record: &QueueRecord<P>) -> Result<RecordId, StoreError> {
    record
        .id
        .ok_or_else(|| StoreError::InvalidRecord("record has no id".to_string()))
}

pub struct InMemoryQueueStore<P> {
    state: Mutex<InMemoryQueueState<P>>,
}

impl<P> InMemoryQueueStore<P> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(InMemoryQueueState::new()),
        }
    }
}

impl<P> Default for InMemoryQueueStore<P> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<P> QueueStore<P> for InMemoryQueueStore<P>
where
    P: Clone + Send + Sync + 'static,
{
    async fn insert(&self, record: QueueRecord<P>) -> Result<(), StoreError> {
        let id = require_id(&record)?;
        let mut state = self.state.lock().await;
        if state.records.contains_key(&id) {
            return Err(StoreError::DuplicateKey(id.to_string()));
        }
        let seq = state.allocate_seq();
        state.records.insert(id, StoredRecord { seq, record });
        Ok(())
    }

    async fn find_one_and_update(
        &self,
        filter: &RecordFilter,
        update: &RecordUpdate,
    ) -> Result<Option<QueueRecord<P>>, StoreError> {
        let mut state = self.state.lock().await;
        let Some(id) = state.first_match(filter) else {
            return Ok(None);
        };
        let Some(stored) = state.records.get_mut(&id) else {
            return Ok(None);
        };
        update.apply(&mut stored.record);
        Ok(Some(stored.record.clone()))
    }

    async fn update_one(
        &self,
        filter: &RecordFilter,
        update: &RecordUpdate,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        let Some(id) = state.first_match(filter) else {
            return Ok(false);
        };
        match state.records.get_mut(&id) {
            Some(stored) => {
                update.apply(&mut stored.record);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_one(&self, filter: &RecordFilter) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        let Some(id) = state.first_match(filter) else {
            return Ok(false);
        };
        Ok(state.records.remove(&id).is_some())
    }

    async fn upsert(&self, record: QueueRecord<P>) -> Result<(), StoreError> {
        let id = require_id(&record)?;
        let mut state = self.state.lock().await;
        // A replaced record queues behind everything inserted before it.
        let seq = state.allocate_seq();
        state.records.insert(id, StoredRecord { seq, record });
        Ok(())
    }

    async fn count(&self, filter: &RecordFilter) -> Result<u64, StoreError> {
        let state = self.state.lock().await;
        let count = state
            .records
            .values()
            .filter(|stored| filter.matches(&stored.record))
            .count();
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::Arc;
    use ulid::Ulid;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn record(payload: &'static str, priority: f64) -> QueueRecord<&'static str> {
        let mut record = QueueRecord::new(payload).with_priority(priority);
        record.id = Some(RecordId::from_ulid(Ulid::new()));
        record.created = at(0);
        record
    }

    #[tokio::test]
    async fn insert_rejects_records_without_id() {
        let store = InMemoryQueueStore::new();
        let err = store.insert(QueueRecord::new("x")).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidRecord(_)));
    }

    #[tokio::test]
    async fn find_one_and_update_follows_priority_then_arrival() {
        let store = InMemoryQueueStore::new();
        store.insert(record("b", 0.5)).await.unwrap();
        store.insert(record("a", 0.1)).await.unwrap();
        store.insert(record("c", 0.5)).await.unwrap();

        let lease = RecordUpdate::lease_until(at(100));
        let mut order = Vec::new();
        while let Some(r) = store
            .find_one_and_update(&RecordFilter::available(at(1)), &lease)
            .await
            .unwrap()
        {
            order.push(r.payload);
        }
        assert_eq!(order, vec!["a", "b", "c"]);
        assert_eq!(store.count(&RecordFilter::leased(at(1))).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn concurrent_leases_never_share_a_record() {
        let store = Arc::new(InMemoryQueueStore::new());
        store.insert(record("only", 0.5)).await.unwrap();

        let mut joins = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            joins.push(tokio::spawn(async move {
                store
                    .find_one_and_update(
                        &RecordFilter::available(at(1)),
                        &RecordUpdate::lease_until(at(100)),
                    )
                    .await
                    .unwrap()
            }));
        }
        let mut winners = 0;
        for join in joins {
            if join.await.unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn upsert_replaces_in_place() {
        let store = InMemoryQueueStore::new();
        let original = record("old", 0.5);
        let id = original.id.unwrap();
        store.insert(original).await.unwrap();

        let mut replacement = record("new", 0.2);
        replacement.id = Some(id);
        store.upsert(replacement).await.unwrap();

        assert_eq!(store.count(&RecordFilter::all()).await.unwrap(), 1);
        let found = store
            .find_one_and_update(&RecordFilter::by_id(id), &RecordUpdate::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.payload, "new");
    }

    #[tokio::test]
    async fn delete_one_reports_absence() {
        let store: InMemoryQueueStore<&'static str> = InMemoryQueueStore::new();
        let id = RecordId::from_ulid(Ulid::new());
        assert!(!store.delete_one(&RecordFilter::by_id(id)).await.unwrap());
    }
}
