//! Perpetual task registration record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    AccountId, PerpetualTaskClientContext, PerpetualTaskId, PerpetualTaskResponse,
    PerpetualTaskSchedule, PerpetualTaskType, WorkerId,
};

/// Lifecycle of a registration as seen by the control plane.
///
/// - TaskUnassigned -> TaskAssigned (assignment)
/// - TaskAssigned -> TaskFailed (a run reported failure) -> TaskAssigned (next success)
/// - TaskAssigned -> TaskInvalid (the task can never run, e.g. bad credentials)
/// - any -> TaskUnassigned (stale heartbeat, reset without a worker)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PerpetualTaskState {
    TaskUnassigned,
    TaskAssigned,
    TaskInvalid,
    TaskFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnassignedReason {
    NoWorkerAvailable,
    HeartbeatExpired,
    Reset,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerpetualTaskRecord {
    pub task_id: PerpetualTaskId,
    pub account_id: AccountId,
    pub task_type: PerpetualTaskType,
    pub client_context: PerpetualTaskClientContext,
    pub schedule: PerpetualTaskSchedule,

    /// `None` until some assignment mechanism binds the task to a worker.
    pub assigned_worker_id: Option<WorkerId>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub heartbeat_timestamp: Option<DateTime<Utc>>,

    pub state: PerpetualTaskState,
    pub unassigned_reason: Option<UnassignedReason>,

    /// Consecutive failed runs since the last success or reset.
    pub failure_count: u32,
    pub last_response: Option<PerpetualTaskResponse>,

    pub created_at: DateTime<Utc>,
}

impl PerpetualTaskRecord {
    pub fn new(
        task_id: PerpetualTaskId,
        account_id: AccountId,
        task_type: PerpetualTaskType,
        client_context: PerpetualTaskClientContext,
        schedule: PerpetualTaskSchedule,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id,
            account_id,
            task_type,
            client_context,
            schedule,
            assigned_worker_id: None,
            assigned_at: None,
            heartbeat_timestamp: None,
            state: PerpetualTaskState::TaskUnassigned,
            unassigned_reason: Some(UnassignedReason::NoWorkerAvailable),
            failure_count: 0,
            last_response: None,
            created_at,
        }
    }

    /// Last liveness evidence: the later of the heartbeat and the assignment
    /// time, so a heartbeat left over from a previous assignment does not
    /// count against the current one.
    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        match (self.heartbeat_timestamp, self.assigned_at) {
            (Some(heartbeat), Some(assigned)) => Some(heartbeat.max(assigned)),
            (heartbeat, assigned) => heartbeat.or(assigned),
        }
    }
}
