//! Durable lease-based priority queue.

mod durable;
mod filter;
mod record;
mod retry;

pub use durable::{DEFAULT_POLL_INTERVAL, DurableQueue};
pub use filter::CountFilter;
pub use record::{DEFAULT_PRIORITY, QueueRecord};
pub use retry::RetryPolicy;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CourierError;

/// Queue port.
///
/// A record returned by `get` is leased: no other consumer receives it until
/// the holder calls `ack`/`requeue*`, or the lease expires. A record that was
/// never sent (`id == None`) is rejected with `NullArgument` by every
/// operation that addresses an existing record.
#[async_trait]
pub trait Queue<P>: Send + Sync
where
    P: Clone + Send + Sync + 'static,
{
    /// Persist a new record and return it as stored (id, `created`, version).
    async fn send(&self, record: QueueRecord<P>) -> Result<QueueRecord<P>, CourierError>;

    /// Lease the next available record, waiting up to `wait`.
    /// `Duration::ZERO` tries exactly once.
    async fn get(&self, wait: Duration) -> Result<Option<QueueRecord<P>>, CourierError>;

    async fn get_with_poll(
        &self,
        poll_interval: Duration,
        wait: Duration,
    ) -> Result<Option<QueueRecord<P>>, CourierError>;

    /// Delete the record. Acking a record that is already gone succeeds.
    async fn ack(&self, record: &QueueRecord<P>) -> Result<(), CourierError>;

    /// Replace `old` with `new` under `old`'s id, with a fresh `created`.
    async fn ack_send(
        &self,
        old: &QueueRecord<P>,
        new: QueueRecord<P>,
    ) -> Result<QueueRecord<P>, CourierError>;

    /// Release the lease; available now, same priority.
    async fn requeue(&self, record: &QueueRecord<P>) -> Result<(), CourierError>;

    async fn requeue_at(
        &self,
        record: &QueueRecord<P>,
        earliest_get: DateTime<Utc>,
    ) -> Result<(), CourierError>;

    /// Release the lease with a new `earliest_get` and `priority`.
    /// `created` is untouched. A NaN priority is `InvalidArgument`.
    async fn requeue_with_priority(
        &self,
        record: &QueueRecord<P>,
        earliest_get: DateTime<Utc>,
        priority: f64,
    ) -> Result<(), CourierError>;

    /// Release the lease and set the remaining retry budget.
    async fn requeue_with_retries(
        &self,
        record: &QueueRecord<P>,
        retries: u32,
        earliest_get: DateTime<Utc>,
    ) -> Result<(), CourierError>;

    async fn count(&self, filter: CountFilter) -> Result<u64, CourierError>;

    /// Extend an active lease by the configured reset duration. Returns
    /// `false`, changing nothing, when the lease has already expired.
    async fn update_reset_duration(&self, record: &QueueRecord<P>) -> Result<bool, CourierError>;
}
