//! Executors: what actually runs a perpetual task once per interval.
//!
//! `PerpetualTaskExecutor<T>` is the typed surface; `DynExecutor` is the
//! object-safe form stored in the registry. `TypedExecutor<T, E>` bridges the
//! two by decoding the JSON payload into `T`.

use std::marker::PhantomData;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::params::TaskParamsKind;
use crate::domain::PerpetualTaskId;
use crate::error::CourierError;

#[async_trait]
pub trait PerpetualTaskExecutor<T: TaskParamsKind>: Send + Sync {
    /// One execution. An `Err` is reported as a failed run; the worker runs
    /// the task again at the next tick regardless.
    async fn run_once(
        &self,
        task_id: PerpetualTaskId,
        params: T,
        heartbeat: Option<DateTime<Utc>>,
    ) -> Result<(), CourierError>;

    /// Called once the task stops running on this worker.
    async fn cleanup(&self, _task_id: PerpetualTaskId, _params: T) -> Result<(), CourierError> {
        Ok(())
    }
}

#[async_trait]
pub trait DynExecutor: Send + Sync {
    async fn run_dyn(
        &self,
        task_id: PerpetualTaskId,
        payload: &serde_json::Value,
        heartbeat: Option<DateTime<Utc>>,
    ) -> Result<(), CourierError>;

    async fn cleanup_dyn(
        &self,
        task_id: PerpetualTaskId,
        payload: &serde_json::Value,
    ) -> Result<(), CourierError>;

    fn params_type(&self) -> &'static str;
}

pub struct TypedExecutor<T: TaskParamsKind, E: PerpetualTaskExecutor<T>> {
    executor: E,
    _marker: PhantomData<fn() -> T>,
}

impl<T: TaskParamsKind, E: PerpetualTaskExecutor<T>> TypedExecutor<T, E> {
    pub fn new(executor: E) -> Self {
        Self {
            executor,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: TaskParamsKind, E: PerpetualTaskExecutor<T>> DynExecutor for TypedExecutor<T, E> {
    async fn run_dyn(
        &self,
        task_id: PerpetualTaskId,
        payload: &serde_json::Value,
        heartbeat: Option<DateTime<Utc>>,
    ) -> Result<(), CourierError> {
        let params: T = serde_json::from_value(payload.clone())?;
        self.executor.run_once(task_id, params, heartbeat).await
    }

    async fn cleanup_dyn(
        &self,
        task_id: PerpetualTaskId,
        payload: &serde_json::Value,
    ) -> Result<(), CourierError> {
        let params: T = serde_json::from_value(payload.clone())?;
        self.executor.cleanup(task_id, params).await
    }

    fn params_type(&self) -> &'static str {
        T::TYPE
    }
}
