//! Execution parameters handed from the control plane to a worker.

use serde::{Deserialize, Serialize};

use super::{PerpetualTaskId, PerpetualTaskSchedule, PerpetualTaskType};
use chrono::{DateTime, Utc};

/// Tagged execution parameters: `task_type` decides which executor decodes
/// `payload`. Decoding happens once, at the worker boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskParams {
    pub task_type: PerpetualTaskType,
    pub payload: serde_json::Value,
}

impl TaskParams {
    pub fn new(task_type: PerpetualTaskType, payload: serde_json::Value) -> Self {
        Self { task_type, payload }
    }
}

/// Everything a worker needs to schedule one perpetual task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerpetualTaskExecutionContext {
    pub task_id: PerpetualTaskId,
    pub params: TaskParams,
    pub schedule: PerpetualTaskSchedule,
    pub heartbeat_timestamp: Option<DateTime<Utc>>,
}
