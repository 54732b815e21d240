//! PerpetualTaskControlPlane port: what a worker needs from the control
//! plane. In-process it is served by `perpetual::LocalControlPlane`; across
//! processes by whatever transport wraps it.

use async_trait::async_trait;

use crate::domain::{
    PerpetualTaskExecutionContext, PerpetualTaskId, PerpetualTaskResponse, WorkerId,
};
use crate::error::CourierError;

#[async_trait]
pub trait PerpetualTaskControlPlane: Send + Sync {
    async fn list_assigned_task_ids(
        &self,
        worker_id: &WorkerId,
    ) -> Result<Vec<PerpetualTaskId>, CourierError>;

    /// Resolve the stored context into ready-to-run parameters.
    async fn get_execution_context(
        &self,
        task_id: PerpetualTaskId,
    ) -> Result<PerpetualTaskExecutionContext, CourierError>;

    /// Report one execution result; doubles as the worker's heartbeat.
    /// Reports from a worker the task is no longer assigned to are ignored.
    async fn publish_response(
        &self,
        worker_id: &WorkerId,
        task_id: PerpetualTaskId,
        response: PerpetualTaskResponse,
    ) -> Result<(), CourierError>;
}
