//! QueueStore port: durable storage for queue records.
//!
//! The store exposes filter/update value objects instead of a query
//! language. Its only atomic read-modify-write, `find_one_and_update`, is the
//! mutual-exclusion point of the whole queue: two concurrent callers must
//! never both receive the same record.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::StoreError;
use crate::domain::RecordId;
use crate::queue::QueueRecord;

/// Predicate over queue records. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    pub id: Option<RecordId>,
    /// Matches records available at this instant.
    pub available_at: Option<DateTime<Utc>>,
    /// Matches records whose lease is still active at this instant.
    pub leased_at: Option<DateTime<Utc>>,
    /// Matches records stamped with exactly this version.
    pub version: Option<String>,
    /// Matches records leased exactly this many times. Fences a renewal to
    /// the lease it was issued for.
    pub attempts: Option<u32>,
}

impl RecordFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_id(id: RecordId) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn available(now: DateTime<Utc>) -> Self {
        Self {
            available_at: Some(now),
            ..Self::default()
        }
    }

    pub fn leased(now: DateTime<Utc>) -> Self {
        Self {
            leased_at: Some(now),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: RecordId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_version(mut self, version: Option<String>) -> Self {
        self.version = version;
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }

    pub fn matches<P>(&self, record: &QueueRecord<P>) -> bool {
        if let Some(id) = self.id
            && record.id != Some(id)
        {
            return false;
        }
        if let Some(now) = self.available_at
            && !record.is_available_at(now)
        {
            return false;
        }
        if let Some(now) = self.leased_at
            && !record.is_leased_at(now)
        {
            return false;
        }
        if let Some(version) = &self.version
            && record.version.as_ref() != Some(version)
        {
            return false;
        }
        if let Some(attempts) = self.attempts
            && record.attempts != attempts
        {
            return false;
        }
        true
    }
}

/// Field assignments applied to a matched record. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordUpdate {
    /// `Some(None)` clears the lease.
    pub reset_timestamp: Option<Option<DateTime<Utc>>>,
    pub earliest_get: Option<DateTime<Utc>>,
    pub priority: Option<f64>,
    pub retries: Option<u32>,
    pub increment_attempts: bool,
}

impl RecordUpdate {
    pub fn lease_until(reset: DateTime<Utc>) -> Self {
        Self {
            reset_timestamp: Some(Some(reset)),
            increment_attempts: true,
            ..Self::default()
        }
    }

    pub fn extend_lease(reset: DateTime<Utc>) -> Self {
        Self {
            reset_timestamp: Some(Some(reset)),
            ..Self::default()
        }
    }

    pub fn release(earliest_get: DateTime<Utc>, priority: f64) -> Self {
        Self {
            reset_timestamp: Some(None),
            earliest_get: Some(earliest_get),
            priority: Some(priority),
            ..Self::default()
        }
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn apply<P>(&self, record: &mut QueueRecord<P>) {
        if let Some(reset) = self.reset_timestamp {
            record.reset_timestamp = reset;
        }
        if let Some(earliest_get) = self.earliest_get {
            record.earliest_get = earliest_get;
        }
        if let Some(priority) = self.priority {
            record.priority = priority;
        }
        if let Some(retries) = self.retries {
            record.retries = retries;
        }
        if self.increment_attempts {
            record.attempts = record.attempts.saturating_add(1);
        }
    }
}

#[async_trait]
pub trait QueueStore<P>: Send + Sync
where
    P: Send + Sync + 'static,
{
    /// Insert a new record; its id must be set.
    async fn insert(&self, record: QueueRecord<P>) -> Result<(), StoreError>;

    /// Atomically pick the first matching record (priority ascending, then
    /// created ascending, then insertion order), apply `update`, and return
    /// the updated record.
    async fn find_one_and_update(
        &self,
        filter: &RecordFilter,
        update: &RecordUpdate,
    ) -> Result<Option<QueueRecord<P>>, StoreError>;

    /// Apply `update` to the first matching record. Returns whether one matched.
    async fn update_one(
        &self,
        filter: &RecordFilter,
        update: &RecordUpdate,
    ) -> Result<bool, StoreError>;

    async fn delete_one(&self, filter: &RecordFilter) -> Result<bool, StoreError>;

    /// Replace the record with the same id, inserting it if absent.
    async fn upsert(&self, record: QueueRecord<P>) -> Result<(), StoreError>;

    async fn count(&self, filter: &RecordFilter) -> Result<u64, StoreError>;
}
