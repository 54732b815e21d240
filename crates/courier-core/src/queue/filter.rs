use serde::{Deserialize, Serialize};

/// Selector for [`Queue::count`](super::Queue::count).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CountFilter {
    All,
    /// Leased and the lease has not expired.
    Running,
    NotRunning,
}
