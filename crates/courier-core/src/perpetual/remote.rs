//! Forwarding client for task types owned by another service.
//!
//! Registration stays local; parameter resolution, state-change reports and
//! validation probes go over a `TaskServiceRpc` channel. The worker loop
//! cannot tell it apart from an in-process client.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::client::{ClientParams, PerpetualTaskServiceClient};
use super::service::PerpetualTaskService;
use crate::domain::{
    AccountId, DelegateTask, PerpetualTaskClientContext, PerpetualTaskId, PerpetualTaskResponse,
    PerpetualTaskSchedule, PerpetualTaskType, TaskParams,
};
use crate::error::CourierError;
use crate::ports::TaskServiceRpc;

pub struct RemotePerpetualTaskClient {
    task_type: PerpetualTaskType,
    schedule: PerpetualTaskSchedule,
    service: Arc<PerpetualTaskService>,
    rpc: Arc<dyn TaskServiceRpc>,
}

impl RemotePerpetualTaskClient {
    pub fn new(
        task_type: PerpetualTaskType,
        schedule: PerpetualTaskSchedule,
        service: Arc<PerpetualTaskService>,
        rpc: Arc<dyn TaskServiceRpc>,
    ) -> Self {
        Self {
            task_type,
            schedule,
            service,
            rpc,
        }
    }
}

#[async_trait]
impl PerpetualTaskServiceClient for RemotePerpetualTaskClient {
    async fn create(
        &self,
        account_id: &AccountId,
        params: &ClientParams,
    ) -> Result<PerpetualTaskId, CourierError> {
        self.service
            .create_task(
                self.task_type.clone(),
                account_id.clone(),
                PerpetualTaskClientContext::new(params.clone()),
                self.schedule,
                false,
            )
            .await
    }

    async fn delete(
        &self,
        account_id: &AccountId,
        task_id: PerpetualTaskId,
    ) -> Result<bool, CourierError> {
        self.service.delete_task(account_id, task_id).await
    }

    async fn get_task_params(
        &self,
        context: &PerpetualTaskClientContext,
    ) -> Result<TaskParams, CourierError> {
        // executors are keyed by the params tag, not the task type
        let params = self.rpc.obtain_task_params(&self.task_type, context).await?;
        if params.task_type != self.task_type {
            debug!(task_type = %self.task_type, params_type = %params.task_type, "params carry their own type tag");
        }
        Ok(params)
    }

    async fn on_task_state_change(
        &self,
        task_id: PerpetualTaskId,
        new_response: &PerpetualTaskResponse,
        old_response: Option<&PerpetualTaskResponse>,
    ) -> Result<(), CourierError> {
        debug!(%task_id, task_type = %self.task_type, code = new_response.response_code, "forwarding state change");
        self.rpc
            .report_state_change(&self.task_type, task_id, new_response, old_response)
            .await
    }

    async fn get_validation_task(
        &self,
        context: &PerpetualTaskClientContext,
        account_id: &AccountId,
    ) -> Result<DelegateTask, CourierError> {
        self.rpc
            .obtain_validation_task(&self.task_type, context, account_id)
            .await
    }
}
