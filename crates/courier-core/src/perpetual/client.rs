//! Per-task-type client contract and the registry that maps a task type to
//! its client.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{
    AccountId, DelegateTask, PerpetualTaskClientContext, PerpetualTaskId, PerpetualTaskResponse,
    PerpetualTaskType, TaskParams,
};
use crate::error::CourierError;

/// Caller-supplied parameters a client turns into a stored context.
pub type ClientParams = BTreeMap<String, String>;

/// What a task type plugs into the scheduler.
///
/// The scheduler never interprets a client context itself; it only hands it
/// back to the client that created it.
#[async_trait]
pub trait PerpetualTaskServiceClient: Send + Sync {
    /// Translate `params` into a client context and register the task.
    async fn create(
        &self,
        account_id: &AccountId,
        params: &ClientParams,
    ) -> Result<PerpetualTaskId, CourierError>;

    async fn delete(
        &self,
        account_id: &AccountId,
        task_id: PerpetualTaskId,
    ) -> Result<bool, CourierError>;

    /// Resolve the stored context into parameters for one run. Must be
    /// idempotent and free of side effects.
    async fn get_task_params(
        &self,
        context: &PerpetualTaskClientContext,
    ) -> Result<TaskParams, CourierError>;

    /// Called after every execution attempt. Callers bound it with a
    /// timeout, so long work belongs on a spawned task.
    async fn on_task_state_change(
        &self,
        task_id: PerpetualTaskId,
        new_response: &PerpetualTaskResponse,
        old_response: Option<&PerpetualTaskResponse>,
    ) -> Result<(), CourierError>;

    /// Cheap one-shot probe checking that a worker can reach the resource
    /// the task will poll.
    async fn get_validation_task(
        &self,
        context: &PerpetualTaskClientContext,
        account_id: &AccountId,
    ) -> Result<DelegateTask, CourierError>;
}

/// Task type -> client. Built once at startup and shared by reference.
#[derive(Default)]
pub struct PerpetualTaskClientRegistry {
    clients: HashMap<PerpetualTaskType, Arc<dyn PerpetualTaskServiceClient>>,
}

impl PerpetualTaskClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        task_type: PerpetualTaskType,
        client: Arc<dyn PerpetualTaskServiceClient>,
    ) -> Result<(), CourierError> {
        if self.clients.contains_key(&task_type) {
            return Err(CourierError::DuplicateClient(task_type));
        }
        self.clients.insert(task_type, client);
        Ok(())
    }

    pub fn get(
        &self,
        task_type: &PerpetualTaskType,
    ) -> Result<Arc<dyn PerpetualTaskServiceClient>, CourierError> {
        self.clients
            .get(task_type)
            .cloned()
            .ok_or_else(|| CourierError::ClientNotFound(task_type.clone()))
    }

    pub fn registered_types(&self) -> Vec<PerpetualTaskType> {
        let mut types: Vec<_> = self.clients.keys().cloned().collect();
        types.sort();
        types
    }
}
