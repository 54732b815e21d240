//! Control-plane registry of perpetual tasks.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::domain::{
    AccountId, PerpetualTaskClientContext, PerpetualTaskId, PerpetualTaskRecord,
    PerpetualTaskResponse, PerpetualTaskSchedule, PerpetualTaskState, PerpetualTaskType,
    UnassignedReason, WorkerId,
};
use crate::error::CourierError;
use crate::ports::{Clock, IdGenerator, PerpetualTaskStore, StoreError, TaskFilter, TaskUpdate};

pub struct PerpetualTaskService {
    store: Arc<dyn PerpetualTaskStore>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl PerpetualTaskService {
    pub fn new(
        store: Arc<dyn PerpetualTaskStore>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self { store, clock, ids }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Register a task. Unless `allow_duplicate`, an existing registration
    /// with the same account, type and context is returned instead, and the
    /// store enforces the uniqueness so concurrent creates converge on one
    /// record.
    pub async fn create_task(
        &self,
        task_type: PerpetualTaskType,
        account_id: AccountId,
        context: PerpetualTaskClientContext,
        schedule: PerpetualTaskSchedule,
        allow_duplicate: bool,
    ) -> Result<PerpetualTaskId, CourierError> {
        if schedule.interval.is_zero() {
            return Err(CourierError::InvalidArgument(
                "create_task: schedule interval must be positive".to_string(),
            ));
        }

        if !allow_duplicate {
            let dedup =
                TaskFilter::by_dedup_key(account_id.clone(), task_type.clone(), context.clone());
            if let Some(existing) = self.store.find_one(&dedup).await? {
                debug!(task_id = %existing.task_id, %task_type, "reusing existing perpetual task");
                return Ok(existing.task_id);
            }
        }

        let task_id = self.ids.generate_perpetual_task_id();
        let record = PerpetualTaskRecord::new(
            task_id,
            account_id.clone(),
            task_type.clone(),
            context,
            schedule,
            self.clock.now(),
        );

        match self.store.insert(record, !allow_duplicate).await {
            Ok(()) => {
                info!(%task_id, %task_type, %account_id, "created perpetual task");
                Ok(task_id)
            }
            Err(StoreError::DuplicateKey(existing)) => {
                let existing = existing.parse::<PerpetualTaskId>().map_err(|e| {
                    CourierError::Store(StoreError::InvalidRecord(format!(
                        "duplicate key carried an unparsable id {existing}: {e}"
                    )))
                })?;
                debug!(task_id = %existing, %task_type, "lost create race; reusing existing perpetual task");
                Ok(existing)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Clear failure state and release the worker so the task is assigned
    /// afresh. Returns `false` when the account has no such task.
    pub async fn reset_task(
        &self,
        account_id: &AccountId,
        task_id: PerpetualTaskId,
    ) -> Result<bool, CourierError> {
        let update = TaskUpdate {
            assigned_worker_id: Some(None),
            assigned_at: Some(None),
            state: Some(PerpetualTaskState::TaskUnassigned),
            unassigned_reason: Some(Some(UnassignedReason::Reset)),
            failure_count: Some(0),
            ..TaskUpdate::default()
        };
        let previous = self
            .store
            .find_one_and_update(
                &TaskFilter::by_id(task_id).with_account(account_id.clone()),
                &update,
            )
            .await?;
        if let Some(previous) = &previous {
            info!(%task_id, previous_worker = ?previous.assigned_worker_id, "reset perpetual task");
        }
        Ok(previous.is_some())
    }

    pub async fn delete_task(
        &self,
        account_id: &AccountId,
        task_id: PerpetualTaskId,
    ) -> Result<bool, CourierError> {
        let deleted = self
            .store
            .delete_one(&TaskFilter::by_id(task_id).with_account(account_id.clone()))
            .await?;
        if deleted {
            info!(%task_id, %account_id, "deleted perpetual task");
        }
        Ok(deleted)
    }

    pub async fn list_assigned_task_ids(
        &self,
        worker_id: &WorkerId,
    ) -> Result<Vec<PerpetualTaskId>, CourierError> {
        let records = self
            .store
            .find(&TaskFilter::by_worker(worker_id.clone()))
            .await?;
        Ok(records.into_iter().map(|r| r.task_id).collect())
    }

    pub async fn list_tasks_for_account(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<PerpetualTaskRecord>, CourierError> {
        Ok(self
            .store
            .find(&TaskFilter::by_account(account_id.clone()))
            .await?)
    }

    pub async fn get_task_record(
        &self,
        task_id: PerpetualTaskId,
    ) -> Result<Option<PerpetualTaskRecord>, CourierError> {
        Ok(self.store.find_one(&TaskFilter::by_id(task_id)).await?)
    }

    async fn require_record(
        &self,
        task_id: PerpetualTaskId,
    ) -> Result<PerpetualTaskRecord, CourierError> {
        self.get_task_record(task_id)
            .await?
            .ok_or_else(|| CourierError::NotFound(format!("perpetual task {task_id}")))
    }

    pub async fn get_task_context(
        &self,
        task_id: PerpetualTaskId,
    ) -> Result<PerpetualTaskClientContext, CourierError> {
        Ok(self.require_record(task_id).await?.client_context)
    }

    pub async fn get_perpetual_task_type(
        &self,
        task_id: PerpetualTaskId,
    ) -> Result<PerpetualTaskType, CourierError> {
        Ok(self.require_record(task_id).await?.task_type)
    }

    /// Record liveness. Returns `false` when the task does not exist.
    pub async fn update_heartbeat(
        &self,
        task_id: PerpetualTaskId,
        heartbeat: DateTime<Utc>,
    ) -> Result<bool, CourierError> {
        let update = TaskUpdate {
            heartbeat_timestamp: Some(heartbeat),
            ..TaskUpdate::default()
        };
        Ok(self
            .store
            .find_one_and_update(&TaskFilter::by_id(task_id), &update)
            .await?
            .is_some())
    }

    /// Bind a task to a worker. Returns `false` when the task does not exist.
    pub async fn assign_task(
        &self,
        task_id: PerpetualTaskId,
        worker_id: &WorkerId,
    ) -> Result<bool, CourierError> {
        let update = TaskUpdate {
            assigned_worker_id: Some(Some(worker_id.clone())),
            assigned_at: Some(Some(self.clock.now())),
            state: Some(PerpetualTaskState::TaskAssigned),
            unassigned_reason: Some(None),
            ..TaskUpdate::default()
        };
        let previous = self
            .store
            .find_one_and_update(&TaskFilter::by_id(task_id), &update)
            .await?;
        if previous.is_some() {
            info!(%task_id, %worker_id, "assigned perpetual task");
        }
        Ok(previous.is_some())
    }

    /// Store the result of one run reported by `worker_id`, which also counts
    /// as a heartbeat. Returns the record as it was before, or `None` when
    /// the task is not (or no longer) assigned to that worker.
    pub async fn record_response(
        &self,
        worker_id: &WorkerId,
        task_id: PerpetualTaskId,
        response: &PerpetualTaskResponse,
    ) -> Result<Option<PerpetualTaskRecord>, CourierError> {
        let mut update = TaskUpdate {
            heartbeat_timestamp: Some(response.reported_at),
            state: Some(response.state),
            last_response: Some(response.clone()),
            ..TaskUpdate::default()
        };
        if response.is_success() {
            update.failure_count = Some(0);
        } else {
            update.increment_failure_count = true;
        }

        let filter = TaskFilter {
            task_id: Some(task_id),
            assigned_worker_id: Some(worker_id.clone()),
            ..TaskFilter::default()
        };
        Ok(self.store.find_one_and_update(&filter, &update).await?)
    }

    /// Unassign every task whose last liveness evidence predates `cutoff`.
    pub async fn unassign_stale(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<PerpetualTaskId>, CourierError> {
        let update = TaskUpdate {
            assigned_worker_id: Some(None),
            assigned_at: Some(None),
            state: Some(PerpetualTaskState::TaskUnassigned),
            unassigned_reason: Some(Some(UnassignedReason::HeartbeatExpired)),
            ..TaskUpdate::default()
        };

        let mut unassigned = Vec::new();
        for stale in self.store.find(&TaskFilter::stale_since(cutoff)).await? {
            // Re-check staleness atomically: a heartbeat may have landed since the scan.
            let filter = TaskFilter {
                task_id: Some(stale.task_id),
                last_seen_before: Some(cutoff),
                ..TaskFilter::default()
            };
            if let Some(previous) = self.store.find_one_and_update(&filter, &update).await? {
                info!(
                    task_id = %previous.task_id,
                    worker_id = ?previous.assigned_worker_id,
                    last_seen = ?previous.last_seen(),
                    "unassigned perpetual task with expired heartbeat"
                );
                unassigned.push(previous.task_id);
            }
        }
        Ok(unassigned)
    }
}
