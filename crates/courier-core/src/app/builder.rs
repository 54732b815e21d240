//! WorkerBuilder: registers executors and wires a [`PerpetualTaskWorker`].
//!
//! Startup is fail-fast: task types declared with `expect_task_types` must
//! all have an executor by the time `build` runs.

use std::sync::Arc;

use super::perpetual_worker::PerpetualTaskWorker;
use crate::config::WorkerConfig;
use crate::domain::WorkerId;
use crate::ports::{Clock, PerpetualTaskControlPlane};
use crate::typed::{ExecutorRegistry, PerpetualTaskExecutor, RegistryError, TaskParamsKind};

/// ```ignore
/// let worker = WorkerBuilder::new()
///     .register::<K8sWatchParams, _>(K8sWatcher::new())?
///     .expect_task_types(&["K8S_WATCH"])
///     .build(worker_id, control_plane, clock, config)?;
/// ```
#[derive(Default)]
pub struct WorkerBuilder {
    registry: ExecutorRegistry,
    expected_types: Option<Vec<String>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing executors for task types: {0:?}")]
    MissingTaskTypes(Vec<String>),
}

impl WorkerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: TaskParamsKind, E: PerpetualTaskExecutor<T> + 'static>(
        mut self,
        executor: E,
    ) -> Result<Self, RegistryError> {
        self.registry.register::<T, E>(executor)?;
        Ok(self)
    }

    pub fn expect_task_types(mut self, task_types: &[&str]) -> Self {
        self.expected_types = Some(task_types.iter().map(|t| t.to_string()).collect());
        self
    }

    pub fn build(
        self,
        worker_id: WorkerId,
        control_plane: Arc<dyn PerpetualTaskControlPlane>,
        clock: Arc<dyn Clock>,
        config: WorkerConfig,
    ) -> Result<PerpetualTaskWorker, BuildError> {
        if let Some(expected) = &self.expected_types {
            let registered = self.registry.registered_types();
            let missing: Vec<String> = expected
                .iter()
                .filter(|t| !registered.contains(t))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingTaskTypes(missing));
            }
        }
        Ok(PerpetualTaskWorker::new(
            worker_id,
            control_plane,
            Arc::new(self.registry),
            clock,
            config,
        ))
    }
}
