//! TaskServiceRpc port: channel to a service that owns a perpetual task type
//! in another process.

use async_trait::async_trait;

use crate::domain::{
    AccountId, DelegateTask, PerpetualTaskClientContext, PerpetualTaskId, PerpetualTaskResponse,
    PerpetualTaskType, TaskParams,
};
use crate::error::CourierError;

#[async_trait]
pub trait TaskServiceRpc: Send + Sync {
    async fn obtain_task_params(
        &self,
        task_type: &PerpetualTaskType,
        context: &PerpetualTaskClientContext,
    ) -> Result<TaskParams, CourierError>;

    async fn report_state_change(
        &self,
        task_type: &PerpetualTaskType,
        task_id: PerpetualTaskId,
        new_response: &PerpetualTaskResponse,
        old_response: Option<&PerpetualTaskResponse>,
    ) -> Result<(), CourierError>;

    async fn obtain_validation_task(
        &self,
        task_type: &PerpetualTaskType,
        context: &PerpetualTaskClientContext,
        account_id: &AccountId,
    ) -> Result<DelegateTask, CourierError>;
}
