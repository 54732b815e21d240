//! Queue depth snapshot.

use serde::Serialize;

use crate::error::CourierError;
use crate::queue::{CountFilter, Queue};

/// `running` records are leased right now; `not_running` are waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub total: u64,
    pub running: u64,
    pub not_running: u64,
}

impl QueueStatus {
    /// Counts are read one after another, so under load they may not add up
    /// exactly.
    pub async fn snapshot<P>(queue: &dyn Queue<P>) -> Result<Self, CourierError>
    where
        P: Clone + Send + Sync + 'static,
    {
        Ok(Self {
            total: queue.count(CountFilter::All).await?,
            running: queue.count(CountFilter::Running).await?,
            not_running: queue.count(CountFilter::NotRunning).await?,
        })
    }
}
