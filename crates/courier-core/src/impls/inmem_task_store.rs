//! In-memory PerpetualTaskStore.
//!
//! The dedup-key constraint is checked and the record inserted under the
//! same lock, so two racing `create` calls cannot both succeed.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{PerpetualTaskId, PerpetualTaskRecord};
use crate::ports::{PerpetualTaskStore, StoreError, TaskFilter, TaskUpdate};

#[derive(Default)]
struct InMemoryTaskState {
    records: HashMap<PerpetualTaskId, PerpetualTaskRecord>,
}

impl InMemoryTaskState {
    /// Matching records, oldest registration first.
    fn matching(&self, filter: &TaskFilter) -> Vec<&PerpetualTaskRecord> {
        let mut found: Vec<_> = self
            .records
            .values()
            .filter(|record| filter.matches(record))
            .collect();
        found.sort_by_key(|record| (record.created_at, record.task_id));
        found
    }

    fn first_match(&self, filter: &TaskFilter) -> Option<PerpetualTaskId> {
        // Fast path for id lookups.
        if let Some(task_id) = filter.task_id {
            return self
                .records
                .get(&task_id)
                .filter(|record| filter.matches(record))
                .map(|record| record.task_id);
        }
        self.matching(filter).first().map(|record| record.task_id)
    }
}

#[derive(Default)]
pub struct InMemoryPerpetualTaskStore {
    state: Mutex<InMemoryTaskState>,
}

impl InMemoryPerpetualTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PerpetualTaskStore for InMemoryPerpetualTaskStore {
    async fn insert(
        &self,
        record: PerpetualTaskRecord,
        enforce_unique: bool,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.records.contains_key(&record.task_id) {
            return Err(StoreError::DuplicateKey(record.task_id.to_string()));
        }
        if enforce_unique {
            let filter = TaskFilter::by_dedup_key(
                record.account_id.clone(),
                record.task_type.clone(),
                record.client_context.clone(),
            );
            if let Some(existing) = state.matching(&filter).first() {
                return Err(StoreError::DuplicateKey(existing.task_id.to_string()));
            }
        }
        state.records.insert(record.task_id, record);
        Ok(())
    }

    async fn find_one(
        &self,
        filter: &TaskFilter,
    ) -> Result<Option<PerpetualTaskRecord>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .first_match(filter)
            .and_then(|id| state.records.get(&id))
            .cloned())
    }

    async fn find(&self, filter: &TaskFilter) -> Result<Vec<PerpetualTaskRecord>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.matching(filter).into_iter().cloned().collect())
    }

    async fn find_one_and_update(
        &self,
        filter: &TaskFilter,
        update: &TaskUpdate,
    ) -> Result<Option<PerpetualTaskRecord>, StoreError> {
        let mut state = self.state.lock().await;
        let Some(id) = state.first_match(filter) else {
            return Ok(None);
        };
        let Some(record) = state.records.get_mut(&id) else {
            return Ok(None);
        };
        let before = record.clone();
        update.apply(record);
        Ok(Some(before))
    }

    async fn delete_one(&self, filter: &TaskFilter) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        let Some(id) = state.first_match(filter) else {
            return Ok(false);
        };
        Ok(state.records.remove(&id).is_some())
    }
}
