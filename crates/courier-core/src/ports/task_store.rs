//! PerpetualTaskStore port: the source of truth for perpetual task
//! registrations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::StoreError;
use crate::domain::{
    AccountId, PerpetualTaskClientContext, PerpetualTaskId, PerpetualTaskRecord,
    PerpetualTaskResponse, PerpetualTaskState, PerpetualTaskType, UnassignedReason, WorkerId,
};

/// Predicate over registrations. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskFilter {
    pub task_id: Option<PerpetualTaskId>,
    pub account_id: Option<AccountId>,
    pub task_type: Option<PerpetualTaskType>,
    pub client_context: Option<PerpetualTaskClientContext>,
    pub assigned_worker_id: Option<WorkerId>,
    /// Matches assigned records whose last liveness evidence is older than
    /// this instant.
    pub last_seen_before: Option<DateTime<Utc>>,
}

impl TaskFilter {
    pub fn by_id(task_id: PerpetualTaskId) -> Self {
        Self {
            task_id: Some(task_id),
            ..Self::default()
        }
    }

    pub fn by_account(account_id: AccountId) -> Self {
        Self {
            account_id: Some(account_id),
            ..Self::default()
        }
    }

    pub fn by_worker(worker_id: WorkerId) -> Self {
        Self {
            assigned_worker_id: Some(worker_id),
            ..Self::default()
        }
    }

    pub fn by_dedup_key(
        account_id: AccountId,
        task_type: PerpetualTaskType,
        client_context: PerpetualTaskClientContext,
    ) -> Self {
        Self {
            account_id: Some(account_id),
            task_type: Some(task_type),
            client_context: Some(client_context),
            ..Self::default()
        }
    }

    pub fn stale_since(cutoff: DateTime<Utc>) -> Self {
        Self {
            last_seen_before: Some(cutoff),
            ..Self::default()
        }
    }

    pub fn with_account(mut self, account_id: AccountId) -> Self {
        self.account_id = Some(account_id);
        self
    }

    pub fn matches(&self, record: &PerpetualTaskRecord) -> bool {
        self.task_id.is_none_or(|id| id == record.task_id)
            && self
                .account_id
                .as_ref()
                .is_none_or(|account| *account == record.account_id)
            && self
                .task_type
                .as_ref()
                .is_none_or(|task_type| *task_type == record.task_type)
            && self
                .client_context
                .as_ref()
                .is_none_or(|context| *context == record.client_context)
            && self
                .assigned_worker_id
                .as_ref()
                .is_none_or(|worker| record.assigned_worker_id.as_ref() == Some(worker))
            && self.last_seen_before.is_none_or(|cutoff| {
                record.assigned_worker_id.is_some()
                    && record.last_seen().is_none_or(|seen| seen < cutoff)
            })
    }
}

/// Field assignments for a registration. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskUpdate {
    pub assigned_worker_id: Option<Option<WorkerId>>,
    pub assigned_at: Option<Option<DateTime<Utc>>>,
    pub heartbeat_timestamp: Option<DateTime<Utc>>,
    pub state: Option<PerpetualTaskState>,
    pub unassigned_reason: Option<Option<UnassignedReason>>,
    pub failure_count: Option<u32>,
    pub increment_failure_count: bool,
    pub last_response: Option<PerpetualTaskResponse>,
}

impl TaskUpdate {
    pub fn apply(&self, record: &mut PerpetualTaskRecord) {
        if let Some(worker) = &self.assigned_worker_id {
            record.assigned_worker_id = worker.clone();
        }
        if let Some(assigned_at) = self.assigned_at {
            record.assigned_at = assigned_at;
        }
        if let Some(heartbeat) = self.heartbeat_timestamp {
            record.heartbeat_timestamp = Some(heartbeat);
        }
        if let Some(state) = self.state {
            record.state = state;
        }
        if let Some(reason) = self.unassigned_reason {
            record.unassigned_reason = reason;
        }
        if let Some(count) = self.failure_count {
            record.failure_count = count;
        }
        if self.increment_failure_count {
            record.failure_count = record.failure_count.saturating_add(1);
        }
        if let Some(response) = &self.last_response {
            record.last_response = Some(response.clone());
        }
    }
}

#[async_trait]
pub trait PerpetualTaskStore: Send + Sync {
    /// Persist a new registration. With `enforce_unique`, a record sharing
    /// the dedup key of an existing one is rejected with
    /// `StoreError::DuplicateKey` carrying the existing task id.
    async fn insert(
        &self,
        record: PerpetualTaskRecord,
        enforce_unique: bool,
    ) -> Result<(), StoreError>;

    async fn find_one(&self, filter: &TaskFilter)
    -> Result<Option<PerpetualTaskRecord>, StoreError>;

    async fn find(&self, filter: &TaskFilter) -> Result<Vec<PerpetualTaskRecord>, StoreError>;

    /// Atomically update the first matching record and return it as it was
    /// before the update.
    async fn find_one_and_update(
        &self,
        filter: &TaskFilter,
        update: &TaskUpdate,
    ) -> Result<Option<PerpetualTaskRecord>, StoreError>;

    async fn delete_one(&self, filter: &TaskFilter) -> Result<bool, StoreError>;
}
