use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How often a perpetual task runs and how long one run may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerpetualTaskSchedule {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PerpetualTaskSchedule {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    pub fn from_parts(interval_seconds: u64, timeout_millis: u64) -> Self {
        Self::new(
            Duration::from_secs(interval_seconds),
            Duration::from_millis(timeout_millis),
        )
    }
}

impl Default for PerpetualTaskSchedule {
    fn default() -> Self {
        Self::from_parts(60, 30_000)
    }
}
