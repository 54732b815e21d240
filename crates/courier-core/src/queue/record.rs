//! Durable queue record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::RecordId;

/// Priority given to records that do not set one. Lower is served first.
pub const DEFAULT_PRIORITY: f64 = 0.5;

/// One durable queue entry.
///
/// Ordering among available records is `priority` ascending, then `created`
/// ascending. A record is available when `earliest_get <= now` and its lease
/// (`reset_timestamp`) is unset or already in the past.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueRecord<P> {
    /// Assigned by `send`; `None` means the record was never persisted.
    pub id: Option<RecordId>,
    pub payload: P,
    pub priority: f64,
    pub earliest_get: DateTime<Utc>,
    pub created: DateTime<Utc>,
    /// Lease expiry. `Some(t)` with `t > now` means currently leased.
    pub reset_timestamp: Option<DateTime<Utc>>,
    /// Producer version; stamped by `send` when unset.
    pub version: Option<String>,
    /// Remaining retry budget consumed by the listener on handler failure.
    pub retries: u32,
    /// Number of successful lease acquisitions.
    pub attempts: u32,
}

impl<P> QueueRecord<P> {
    pub fn new(payload: P) -> Self {
        Self {
            id: None,
            payload,
            priority: DEFAULT_PRIORITY,
            earliest_get: DateTime::UNIX_EPOCH,
            created: DateTime::UNIX_EPOCH,
            reset_timestamp: None,
            version: None,
            retries: 0,
            attempts: 0,
        }
    }

    pub fn with_priority(mut self, priority: f64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_earliest_get(mut self, earliest_get: DateTime<Utc>) -> Self {
        self.earliest_get = earliest_get;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn is_available_at(&self, now: DateTime<Utc>) -> bool {
        self.earliest_get <= now && self.reset_timestamp.is_none_or(|reset| reset <= now)
    }

    pub fn is_leased_at(&self, now: DateTime<Utc>) -> bool {
        self.reset_timestamp.is_some_and(|reset| reset > now)
    }
}
