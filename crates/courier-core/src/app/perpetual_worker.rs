//! PerpetualTaskWorker: keeps the set of locally scheduled perpetual tasks in
//! line with what the control plane has assigned to this worker.
//!
//! Each outer tick:
//! 1. refresh the assigned id set (replaced wholesale),
//! 2. stop running tasks that are no longer assigned, or whose job died,
//! 3. start assigned tasks that are not running yet.
//!
//! A started task runs on its own tokio task at a fixed rate, first run
//! immediately. Stopping aborts that tokio task, so an in-flight run is
//! dropped at its next await point. A panicking run is reported as a
//! failure and the schedule carries on.

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::WorkerConfig;
use crate::domain::{
    PerpetualTaskExecutionContext, PerpetualTaskId, PerpetualTaskResponse, WorkerId,
};
use crate::error::{CourierError, panic_message};
use crate::ports::{Clock, PerpetualTaskControlPlane};
use crate::typed::{DynExecutor, ExecutorRegistry};

struct RunningTask {
    handle: JoinHandle<()>,
    executor: Arc<dyn DynExecutor>,
    payload: serde_json::Value,
}

pub struct PerpetualTaskWorker {
    worker_id: WorkerId,
    control_plane: Arc<dyn PerpetualTaskControlPlane>,
    executors: Arc<ExecutorRegistry>,
    clock: Arc<dyn Clock>,
    config: WorkerConfig,
    assigned_tasks: HashSet<PerpetualTaskId>,
    running: HashMap<PerpetualTaskId, RunningTask>,
}

impl PerpetualTaskWorker {
    pub fn new(
        worker_id: WorkerId,
        control_plane: Arc<dyn PerpetualTaskControlPlane>,
        executors: Arc<ExecutorRegistry>,
        clock: Arc<dyn Clock>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            worker_id,
            control_plane,
            executors,
            clock,
            config,
            assigned_tasks: HashSet::new(),
            running: HashMap::new(),
        }
    }

    pub fn worker_id(&self) -> &WorkerId {
        &self.worker_id
    }

    pub fn running_task_ids(&self) -> Vec<PerpetualTaskId> {
        let mut ids: Vec<_> = self.running.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Tick until shutdown, then stop every running task.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(worker_id = %self.worker_id, "perpetual task worker started");
        let period = self.config.assignment_poll_interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }
            if let Err(err) = self.tick().await {
                warn!(worker_id = %self.worker_id, error = %err, "perpetual task tick failed");
            }
        }

        self.stop_all().await;
        info!(worker_id = %self.worker_id, "perpetual task worker stopped");
    }

    /// One outer tick. Fails only when the assignment set cannot be fetched,
    /// in which case nothing is started or stopped.
    pub async fn tick(&mut self) -> Result<(), CourierError> {
        self.update_assigned_task_ids().await?;
        self.stop_cancelled_tasks().await;
        self.start_assigned_tasks().await;
        Ok(())
    }

    async fn update_assigned_task_ids(&mut self) -> Result<(), CourierError> {
        let ids = self
            .control_plane
            .list_assigned_task_ids(&self.worker_id)
            .await?;
        self.assigned_tasks = ids.into_iter().collect();
        Ok(())
    }

    /// Jobs that ended on their own are dropped too, so the start step
    /// brings them back while they stay assigned.
    async fn stop_cancelled_tasks(&mut self) {
        let cancelled: Vec<_> = self
            .running
            .iter()
            .filter(|(id, task)| !self.assigned_tasks.contains(*id) || task.handle.is_finished())
            .map(|(id, _)| *id)
            .collect();
        for task_id in cancelled {
            if let Some(task) = self.running.remove(&task_id) {
                stop_task(task_id, task).await;
            }
        }
    }

    async fn start_assigned_tasks(&mut self) {
        let pending: Vec<_> = self
            .assigned_tasks
            .iter()
            .filter(|id| !self.running.contains_key(*id))
            .copied()
            .collect();
        for task_id in pending {
            match self.start_task(task_id).await {
                Ok(task) => {
                    info!(%task_id, worker_id = %self.worker_id, "started perpetual task");
                    self.running.insert(task_id, task);
                }
                Err(err) => {
                    warn!(%task_id, error = %err, "failed to start perpetual task");
                }
            }
        }
    }

    async fn start_task(&self, task_id: PerpetualTaskId) -> Result<RunningTask, CourierError> {
        let context = self.control_plane.get_execution_context(task_id).await?;
        let params_type = context.params.task_type.as_str();
        let executor = self
            .executors
            .get(params_type)
            .ok_or_else(|| CourierError::ExecutorNotFound(params_type.to_string()))?;
        if context.schedule.interval.is_zero() {
            return Err(CourierError::InvalidArgument(format!(
                "perpetual task {task_id} has a zero interval"
            )));
        }

        let payload = context.params.payload.clone();
        let job = ScheduledJob {
            worker_id: self.worker_id.clone(),
            control_plane: self.control_plane.clone(),
            clock: self.clock.clone(),
            executor: executor.clone(),
            context,
        };
        Ok(RunningTask {
            handle: tokio::spawn(job.run()),
            executor,
            payload,
        })
    }

    async fn stop_all(&mut self) {
        for (task_id, task) in std::mem::take(&mut self.running) {
            stop_task(task_id, task).await;
        }
        self.assigned_tasks.clear();
    }
}

async fn stop_task(task_id: PerpetualTaskId, task: RunningTask) {
    task.handle.abort();
    // wait for the abort to land before cleaning up
    if let Err(err) = task.handle.await
        && !err.is_cancelled()
    {
        warn!(%task_id, error = %err, "perpetual task job died");
    }
    if let Err(err) = task.executor.cleanup_dyn(task_id, &task.payload).await {
        warn!(%task_id, error = %err, "perpetual task cleanup failed");
    }
    info!(%task_id, "stopped perpetual task");
}

/// The recurring job behind one running perpetual task.
struct ScheduledJob {
    worker_id: WorkerId,
    control_plane: Arc<dyn PerpetualTaskControlPlane>,
    clock: Arc<dyn Clock>,
    executor: Arc<dyn DynExecutor>,
    context: PerpetualTaskExecutionContext,
}

impl ScheduledJob {
    async fn run(self) {
        let task_id = self.context.task_id;
        let mut ticker = tokio::time::interval(self.context.schedule.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut heartbeat = self.context.heartbeat_timestamp;

        loop {
            ticker.tick().await;
            let response = self.run_once(heartbeat).await;
            debug!(%task_id, code = response.response_code, "perpetual task run finished");
            heartbeat = Some(response.reported_at);
            if let Err(err) = self
                .control_plane
                .publish_response(&self.worker_id, task_id, response)
                .await
            {
                warn!(%task_id, error = %err, "failed to publish perpetual task response");
            }
        }
    }

    /// A zero timeout leaves the run unbounded.
    async fn run_once(&self, heartbeat: Option<DateTime<Utc>>) -> PerpetualTaskResponse {
        let task_id = self.context.task_id;
        let timeout = self.context.schedule.timeout;
        let run = async {
            let run = self
                .executor
                .run_dyn(task_id, &self.context.params.payload, heartbeat);
            match AssertUnwindSafe(run).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => Err(CourierError::Panicked(panic_message(panic.as_ref()))),
            }
        };

        let result = if timeout.is_zero() {
            run.await
        } else {
            match tokio::time::timeout(timeout, run).await {
                Ok(result) => result,
                Err(_) => {
                    return PerpetualTaskResponse::timed_out(
                        CourierError::Timeout(timeout).to_string(),
                        self.clock.now(),
                    );
                }
            }
        };

        match result {
            Ok(()) => PerpetualTaskResponse::success(self.clock.now()),
            Err(err @ CourierError::Decode(_)) => {
                PerpetualTaskResponse::invalid(err.to_string(), self.clock.now())
            }
            Err(err @ CourierError::Panicked(_)) => {
                warn!(%task_id, error = %err, "perpetual task run panicked");
                PerpetualTaskResponse::failure(err.to_string(), self.clock.now())
            }
            Err(err) => PerpetualTaskResponse::failure(err.to_string(), self.clock.now()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PerpetualTaskSchedule, PerpetualTaskState, TaskParams};
    use crate::ports::SystemClock;
    use crate::typed::params::fixtures::{PingParams, SleepParams};
    use crate::typed::registry::fixtures::{NoopPing, Sleeper};
    use crate::typed::{PerpetualTaskExecutor, TaskParamsKind};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use ulid::Ulid;

    /// Control plane whose assignment set and contexts are set by the test.
    #[derive(Default)]
    struct StubControlPlane {
        assigned: Mutex<Vec<PerpetualTaskId>>,
        contexts: Mutex<HashMap<PerpetualTaskId, PerpetualTaskExecutionContext>>,
        responses: Mutex<Vec<(PerpetualTaskId, PerpetualTaskResponse)>>,
    }

    impl StubControlPlane {
        fn add(&self, params: TaskParams, schedule: PerpetualTaskSchedule) -> PerpetualTaskId {
            let task_id = PerpetualTaskId::from_ulid(Ulid::new());
            self.contexts.lock().unwrap().insert(
                task_id,
                PerpetualTaskExecutionContext {
                    task_id,
                    params,
                    schedule,
                    heartbeat_timestamp: None,
                },
            );
            task_id
        }

        fn assign(&self, ids: &[PerpetualTaskId]) {
            *self.assigned.lock().unwrap() = ids.to_vec();
        }

        fn responses_for(&self, task_id: PerpetualTaskId) -> Vec<PerpetualTaskResponse> {
            self.responses
                .lock()
                .unwrap()
                .iter()
                .filter(|(id, _)| *id == task_id)
                .map(|(_, r)| r.clone())
                .collect()
        }
    }

    #[async_trait]
    impl PerpetualTaskControlPlane for StubControlPlane {
        async fn list_assigned_task_ids(
            &self,
            _worker_id: &WorkerId,
        ) -> Result<Vec<PerpetualTaskId>, CourierError> {
            Ok(self.assigned.lock().unwrap().clone())
        }

        async fn get_execution_context(
            &self,
            task_id: PerpetualTaskId,
        ) -> Result<PerpetualTaskExecutionContext, CourierError> {
            self.contexts
                .lock()
                .unwrap()
                .get(&task_id)
                .cloned()
                .ok_or_else(|| CourierError::NotFound(task_id.to_string()))
        }

        async fn publish_response(
            &self,
            _worker_id: &WorkerId,
            task_id: PerpetualTaskId,
            response: PerpetualTaskResponse,
        ) -> Result<(), CourierError> {
            self.responses.lock().unwrap().push((task_id, response));
            Ok(())
        }
    }

    /// Sets `dropped` when an in-flight run is torn down.
    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    /// Runs forever once started; records cleanup calls.
    struct Hanging {
        started: Arc<AtomicUsize>,
        dropped: Arc<AtomicBool>,
        cleaned: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl PerpetualTaskExecutor<SleepParams> for Hanging {
        async fn run_once(
            &self,
            _task_id: PerpetualTaskId,
            _params: SleepParams,
            _heartbeat: Option<DateTime<Utc>>,
        ) -> Result<(), CourierError> {
            let _guard = DropFlag(self.dropped.clone());
            self.started.fetch_add(1, Ordering::SeqCst);
            std::future::pending::<()>().await;
            Ok(())
        }

        async fn cleanup(
            &self,
            _task_id: PerpetualTaskId,
            _params: SleepParams,
        ) -> Result<(), CourierError> {
            self.cleaned.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Panics on every run.
    struct Exploding {
        runs: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl PerpetualTaskExecutor<PingParams> for Exploding {
        async fn run_once(
            &self,
            _task_id: PerpetualTaskId,
            params: PingParams,
            _heartbeat: Option<DateTime<Utc>>,
        ) -> Result<(), CourierError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            panic!("cannot reach {}", params.host);
        }
    }

    fn ping(host: &str) -> TaskParams {
        PingParams {
            host: host.to_string(),
        }
        .to_task_params()
        .unwrap()
    }

    fn every_minute() -> PerpetualTaskSchedule {
        PerpetualTaskSchedule::new(Duration::from_secs(60), Duration::from_secs(5))
    }

    fn worker(plane: Arc<StubControlPlane>, executors: ExecutorRegistry) -> PerpetualTaskWorker {
        PerpetualTaskWorker::new(
            WorkerId::new("delegate-1"),
            plane,
            Arc::new(executors),
            Arc::new(SystemClock),
            WorkerConfig::default(),
        )
    }

    async fn wait_until(mut done: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !done() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn running_set_converges_on_the_assignment() {
        let plane = Arc::new(StubControlPlane::default());
        let a = plane.add(ping("a"), every_minute());
        let b = plane.add(ping("b"), every_minute());
        let c = plane.add(ping("c"), every_minute());
        let mut executors = ExecutorRegistry::new();
        executors.register::<PingParams, _>(NoopPing).unwrap();
        let mut worker = worker(plane.clone(), executors);

        plane.assign(&[a, b]);
        worker.tick().await.unwrap();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(worker.running_task_ids(), expected);

        plane.assign(&[b, c]);
        worker.tick().await.unwrap();
        let mut expected = vec![b, c];
        expected.sort();
        assert_eq!(worker.running_task_ids(), expected);

        // first run is immediate
        wait_until(|| !plane.responses_for(c).is_empty()).await;
        assert!(plane.responses_for(c)[0].is_success());
    }

    #[tokio::test]
    async fn cancelling_interrupts_an_in_flight_run() {
        let plane = Arc::new(StubControlPlane::default());
        let task = plane.add(
            SleepParams { millis: 0 }.to_task_params().unwrap(),
            PerpetualTaskSchedule::new(Duration::from_secs(60), Duration::ZERO),
        );
        let started = Arc::new(AtomicUsize::new(0));
        let dropped = Arc::new(AtomicBool::new(false));
        let cleaned = Arc::new(AtomicUsize::new(0));
        let mut executors = ExecutorRegistry::new();
        executors
            .register::<SleepParams, _>(Hanging {
                started: started.clone(),
                dropped: dropped.clone(),
                cleaned: cleaned.clone(),
            })
            .unwrap();
        let mut worker = worker(plane.clone(), executors);

        plane.assign(&[task]);
        worker.tick().await.unwrap();
        wait_until(|| started.load(Ordering::SeqCst) == 1).await;
        assert!(!dropped.load(Ordering::SeqCst));

        plane.assign(&[]);
        worker.tick().await.unwrap();
        assert!(worker.running_task_ids().is_empty());
        assert!(dropped.load(Ordering::SeqCst));
        assert_eq!(cleaned.load(Ordering::SeqCst), 1);
        assert!(plane.responses_for(task).is_empty());
    }

    #[tokio::test]
    async fn one_bad_task_does_not_block_the_others() {
        let plane = Arc::new(StubControlPlane::default());
        let good = plane.add(ping("ok"), every_minute());
        let no_executor = plane.add(
            SleepParams { millis: 1 }.to_task_params().unwrap(),
            every_minute(),
        );
        let zero_interval = plane.add(
            ping("z"),
            PerpetualTaskSchedule::new(Duration::ZERO, Duration::ZERO),
        );
        let missing = PerpetualTaskId::from_ulid(Ulid::new());
        let mut executors = ExecutorRegistry::new();
        executors.register::<PingParams, _>(NoopPing).unwrap();
        let mut worker = worker(plane.clone(), executors);

        plane.assign(&[no_executor, missing, zero_interval, good]);
        worker.tick().await.unwrap();
        assert_eq!(worker.running_task_ids(), vec![good]);

        // failed starts are retried on the next tick
        worker.tick().await.unwrap();
        assert_eq!(worker.running_task_ids(), vec![good]);
    }

    #[tokio::test]
    async fn overrunning_the_timeout_reports_a_failure() {
        let plane = Arc::new(StubControlPlane::default());
        let task = plane.add(
            SleepParams { millis: 5_000 }.to_task_params().unwrap(),
            PerpetualTaskSchedule::new(Duration::from_secs(60), Duration::from_millis(20)),
        );
        let mut executors = ExecutorRegistry::new();
        executors.register::<SleepParams, _>(Sleeper).unwrap();
        let mut worker = worker(plane.clone(), executors);

        plane.assign(&[task]);
        worker.tick().await.unwrap();
        wait_until(|| !plane.responses_for(task).is_empty()).await;

        let response = &plane.responses_for(task)[0];
        assert_eq!(response.response_code, PerpetualTaskResponse::TIMED_OUT);
        assert_eq!(response.state, PerpetualTaskState::TaskFailed);
    }

    #[tokio::test]
    async fn panicking_run_is_reported_and_rescheduled() {
        let plane = Arc::new(StubControlPlane::default());
        let task = plane.add(
            ping("down"),
            PerpetualTaskSchedule::new(Duration::from_millis(20), Duration::from_secs(1)),
        );
        let runs = Arc::new(AtomicUsize::new(0));
        let mut executors = ExecutorRegistry::new();
        executors
            .register::<PingParams, _>(Exploding { runs: runs.clone() })
            .unwrap();
        let mut worker = worker(plane.clone(), executors);

        plane.assign(&[task]);
        worker.tick().await.unwrap();
        wait_until(|| plane.responses_for(task).len() >= 3).await;

        assert!(runs.load(Ordering::SeqCst) >= 3);
        let response = &plane.responses_for(task)[0];
        assert_eq!(response.response_code, PerpetualTaskResponse::FAILED);
        assert!(response.response_message.contains("cannot reach down"));

        worker.tick().await.unwrap();
        assert_eq!(worker.running_task_ids(), vec![task]);
    }

    #[tokio::test]
    async fn undecodable_params_mark_the_task_invalid() {
        let plane = Arc::new(StubControlPlane::default());
        let task = plane.add(
            TaskParams::new(PingParams::task_type(), serde_json::json!({ "port": 1 })),
            every_minute(),
        );
        let mut executors = ExecutorRegistry::new();
        executors.register::<PingParams, _>(NoopPing).unwrap();
        let mut worker = worker(plane.clone(), executors);

        plane.assign(&[task]);
        worker.tick().await.unwrap();
        wait_until(|| !plane.responses_for(task).is_empty()).await;
        assert_eq!(plane.responses_for(task)[0].state, PerpetualTaskState::TaskInvalid);
    }

    #[tokio::test]
    async fn shutdown_stops_running_tasks() {
        let plane = Arc::new(StubControlPlane::default());
        let task = plane.add(ping("a"), every_minute());
        plane.assign(&[task]);
        let mut executors = ExecutorRegistry::new();
        executors.register::<PingParams, _>(NoopPing).unwrap();
        let mut worker = PerpetualTaskWorker::new(
            WorkerId::new("delegate-1"),
            plane.clone(),
            Arc::new(executors),
            Arc::new(SystemClock),
            WorkerConfig {
                assignment_poll_interval: Duration::from_millis(10),
                ..WorkerConfig::default()
            },
        );

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            worker.run(rx).await;
            worker
        });
        wait_until(|| !plane.responses_for(task).is_empty()).await;
        tx.send(true).unwrap();

        let worker = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(worker.running_task_ids().is_empty());
    }
}
