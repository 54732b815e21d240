//! In-process `PerpetualTaskControlPlane`: the registry plus the client
//! registry, as a worker sees them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::client::PerpetualTaskClientRegistry;
use super::service::PerpetualTaskService;
use crate::domain::{
    PerpetualTaskExecutionContext, PerpetualTaskId, PerpetualTaskResponse, WorkerId,
};
use crate::error::CourierError;
use crate::ports::PerpetualTaskControlPlane;

pub struct LocalControlPlane {
    service: Arc<PerpetualTaskService>,
    clients: Arc<PerpetualTaskClientRegistry>,
    state_change_timeout: Duration,
}

impl LocalControlPlane {
    pub fn new(
        service: Arc<PerpetualTaskService>,
        clients: Arc<PerpetualTaskClientRegistry>,
        state_change_timeout: Duration,
    ) -> Self {
        Self {
            service,
            clients,
            state_change_timeout,
        }
    }
}

#[async_trait]
impl PerpetualTaskControlPlane for LocalControlPlane {
    async fn list_assigned_task_ids(
        &self,
        worker_id: &WorkerId,
    ) -> Result<Vec<PerpetualTaskId>, CourierError> {
        self.service.list_assigned_task_ids(worker_id).await
    }

    async fn get_execution_context(
        &self,
        task_id: PerpetualTaskId,
    ) -> Result<PerpetualTaskExecutionContext, CourierError> {
        let record = self
            .service
            .get_task_record(task_id)
            .await?
            .ok_or_else(|| CourierError::NotFound(format!("perpetual task {task_id}")))?;
        let client = self.clients.get(&record.task_type)?;
        let params = client.get_task_params(&record.client_context).await?;

        Ok(PerpetualTaskExecutionContext {
            task_id,
            params,
            schedule: record.schedule,
            heartbeat_timestamp: record.heartbeat_timestamp,
        })
    }

    async fn publish_response(
        &self,
        worker_id: &WorkerId,
        task_id: PerpetualTaskId,
        response: PerpetualTaskResponse,
    ) -> Result<(), CourierError> {
        let Some(previous) = self
            .service
            .record_response(worker_id, task_id, &response)
            .await?
        else {
            debug!(%task_id, %worker_id, "ignoring response for a task not assigned to this worker");
            return Ok(());
        };

        let client = self.clients.get(&previous.task_type)?;
        let hook = client.on_task_state_change(task_id, &response, previous.last_response.as_ref());
        match tokio::time::timeout(self.state_change_timeout, hook).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(%task_id, error = %err, "state change hook failed"),
            Err(_) => warn!(
                %task_id,
                timeout = ?self.state_change_timeout,
                "state change hook timed out"
            ),
        }
        Ok(())
    }
}
