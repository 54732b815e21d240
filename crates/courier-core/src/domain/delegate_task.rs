//! One-shot unit of work dispatched to a delegate through the durable queue.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::AccountId;

/// A delegate task, e.g. the validation probe a perpetual task client builds
/// to check that a worker can reach the resource it will poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegateTask {
    pub account_id: AccountId,
    pub task_type: String,
    pub params: serde_json::Value,
    pub timeout: Duration,
}

impl DelegateTask {
    pub fn new(
        account_id: AccountId,
        task_type: impl Into<String>,
        params: serde_json::Value,
        timeout: Duration,
    ) -> Self {
        Self {
            account_id,
            task_type: task_type.into(),
            params,
            timeout,
        }
    }
}
