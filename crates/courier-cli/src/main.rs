use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};

use courier_core::app::{
    HeartbeatReaper, ListenerGroup, MaintenanceMode, MessageHandler, QueueListener, QueueStatus,
    WorkerBuilder,
};
use courier_core::config::{CourierConfig, load_dotenv};
use courier_core::domain::{
    AccountId, DelegateTask, PerpetualTaskClientContext, PerpetualTaskId, PerpetualTaskResponse,
    PerpetualTaskSchedule, TaskParams, WorkerId,
};
use courier_core::error::CourierError;
use courier_core::impls::{InMemoryPerpetualTaskStore, InMemoryQueueStore};
use courier_core::perpetual::{
    ClientParams, LocalControlPlane, PerpetualTaskClientRegistry, PerpetualTaskService,
    PerpetualTaskServiceClient,
};
use courier_core::ports::{Clock, SystemClock, UlidGenerator};
use courier_core::queue::{DurableQueue, Queue, QueueRecord};
use courier_core::typed::{PerpetualTaskExecutor, TaskParamsKind};

// ── CLI ─────────────────────────────────────────────────────────────

/// Runs a control plane and one delegate in-process for a bounded time.
#[derive(Parser, Debug)]
#[command(name = "courier", version, about)]
struct Cli {
    /// Identity of the local delegate.
    #[arg(long, env = "COURIER_WORKER_ID", default_value = "delegate-local")]
    worker_id: String,

    /// Number of queue listeners.
    #[arg(long, env = "COURIER_LISTENERS", default_value_t = 2)]
    listeners: usize,

    /// Endpoints to watch, one perpetual task each.
    #[arg(long = "url", default_values_t = ["http://localhost:8080/health".to_string()])]
    urls: Vec<String>,

    /// Seconds between two runs of a watch task.
    #[arg(long, default_value_t = 1)]
    interval_secs: u64,

    /// How long to run before shutting down, in seconds.
    #[arg(long, env = "COURIER_RUN_SECS", default_value_t = 5)]
    run_secs: u64,
}

// ── Health watch task type ──────────────────────────────────────────

const HEALTH_WATCH: &str = "HEALTH_WATCH";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct HealthWatchParams {
    url: String,
}

impl TaskParamsKind for HealthWatchParams {
    const TYPE: &'static str = HEALTH_WATCH;
}

/// Control-plane side of the health watch type.
struct HealthWatchClient {
    service: Arc<PerpetualTaskService>,
    schedule: PerpetualTaskSchedule,
}

#[async_trait]
impl PerpetualTaskServiceClient for HealthWatchClient {
    async fn create(
        &self,
        account_id: &AccountId,
        params: &ClientParams,
    ) -> Result<PerpetualTaskId, CourierError> {
        let context = PerpetualTaskClientContext::new(params.clone());
        self.service
            .create_task(
                HealthWatchParams::task_type(),
                account_id.clone(),
                context,
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
        let url = context
            .param("url")
            .ok_or_else(|| CourierError::InvalidArgument("health watch without url".to_string()))?;
        HealthWatchParams {
            url: url.to_string(),
        }
        .to_task_params()
    }

    async fn on_task_state_change(
        &self,
        task_id: PerpetualTaskId,
        new_response: &PerpetualTaskResponse,
        old_response: Option<&PerpetualTaskResponse>,
    ) -> Result<(), CourierError> {
        let was = old_response.map(|r| r.response_code);
        if was != Some(new_response.response_code) {
            info!(
                %task_id,
                code = new_response.response_code,
                previous = ?was,
                "health watch changed state"
            );
        }
        Ok(())
    }

    async fn get_validation_task(
        &self,
        context: &PerpetualTaskClientContext,
        account_id: &AccountId,
    ) -> Result<DelegateTask, CourierError> {
        Ok(DelegateTask::new(
            account_id.clone(),
            "HEALTH_WATCH_VALIDATE",
            serde_json::json!({ "url": context.param("url") }),
            Duration::from_secs(10),
        ))
    }
}

/// Delegate side of the health watch type.
#[derive(Default)]
struct HealthWatcher {
    runs: AtomicU64,
}

#[async_trait]
impl PerpetualTaskExecutor<HealthWatchParams> for HealthWatcher {
    async fn run_once(
        &self,
        task_id: PerpetualTaskId,
        params: HealthWatchParams,
        heartbeat: Option<DateTime<Utc>>,
    ) -> Result<(), CourierError> {
        let run = self.runs.fetch_add(1, Ordering::Relaxed) + 1;
        info!(%task_id, url = %params.url, run, last_heartbeat = ?heartbeat, "watching endpoint");
        Ok(())
    }

    async fn cleanup(
        &self,
        task_id: PerpetualTaskId,
        params: HealthWatchParams,
    ) -> Result<(), CourierError> {
        info!(%task_id, url = %params.url, "stopped watching endpoint");
        Ok(())
    }
}

/// Runs validation probes taken off the delegate queue.
struct ProbeHandler;

#[async_trait]
impl MessageHandler<DelegateTask> for ProbeHandler {
    async fn on_message(&self, record: &QueueRecord<DelegateTask>) -> Result<(), CourierError> {
        let probe = &record.payload;
        info!(
            account_id = %probe.account_id,
            task_type = %probe.task_type,
            params = %probe.params,
            "validation probe passed"
        );
        Ok(())
    }

    async fn on_exception(&self, error: &CourierError, record: &QueueRecord<DelegateTask>) {
        warn!(task_type = %record.payload.task_type, error = %error, "validation probe failed");
    }
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = CourierConfig::from_env();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let ids = Arc::new(UlidGenerator::new(clock.clone()));

    // Control plane.
    let service = Arc::new(PerpetualTaskService::new(
        Arc::new(InMemoryPerpetualTaskStore::new()),
        clock.clone(),
        ids.clone(),
    ));
    let client = Arc::new(HealthWatchClient {
        service: service.clone(),
        schedule: PerpetualTaskSchedule::new(
            Duration::from_secs(cli.interval_secs),
            Duration::from_millis(500),
        ),
    });
    let mut clients = PerpetualTaskClientRegistry::new();
    clients.register(HealthWatchParams::task_type(), client.clone())?;
    let control_plane = Arc::new(LocalControlPlane::new(
        service.clone(),
        Arc::new(clients),
        config.worker.state_change_timeout,
    ));

    // Delegate queue, fed with one validation probe per watch task.
    let queue: Arc<dyn Queue<DelegateTask>> = Arc::new(DurableQueue::<DelegateTask>::new(
        Arc::new(InMemoryQueueStore::<DelegateTask>::new()),
        clock.clone(),
        ids.clone(),
        config.queue.clone(),
    ));

    let account = AccountId::new("demo-account");
    let worker_id = WorkerId::new(cli.worker_id.clone());
    for url in &cli.urls {
        let params = ClientParams::from([("url".to_string(), url.clone())]);
        let task_id = client.create(&account, &params).await?;
        let context = service.get_task_context(task_id).await?;
        let probe = client.get_validation_task(&context, &account).await?;
        queue.send(QueueRecord::new(probe)).await?;
        service.assign_task(task_id, &worker_id).await?;
        info!(%task_id, %url, "registered health watch");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let maintenance = MaintenanceMode::new();
    let listeners = (0..cli.listeners)
        .map(|n| {
            Arc::new(QueueListener::new(
                format!("probe-listener-{n}"),
                queue.clone(),
                Arc::new(ProbeHandler),
                clock.clone(),
                maintenance.clone(),
                config.listener.clone(),
            ))
        })
        .collect();
    let group = ListenerGroup::spawn(listeners);

    let mut worker = WorkerBuilder::new()
        .register::<HealthWatchParams, _>(HealthWatcher::default())?
        .expect_task_types(&[HEALTH_WATCH])
        .build(worker_id, control_plane, clock.clone(), config.worker.clone())?;
    let worker_rx = shutdown_rx.clone();
    let worker_join = tokio::spawn(async move { worker.run(worker_rx).await });

    let reaper = HeartbeatReaper::new(service.clone(), clock.clone(), config.reaper.clone());
    let reaper_join = tokio::spawn(async move { reaper.run(shutdown_rx).await });

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(cli.run_secs)) => {}
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }

    let _ = shutdown_tx.send(true);
    let failed_listeners = group.shutdown_and_join().await;
    worker_join.await?;
    reaper_join.await?;

    let status = QueueStatus::snapshot(queue.as_ref()).await?;
    println!("queue: {}", serde_json::to_string(&status)?);
    for record in service.list_tasks_for_account(&account).await? {
        println!(
            "task {} state={:?} failures={} last_response={:?}",
            record.task_id,
            record.state,
            record.failure_count,
            record.last_response.as_ref().map(|r| r.response_code)
        );
    }
    if failed_listeners > 0 {
        anyhow::bail!("{failed_listeners} listener(s) stopped with an error");
    }
    Ok(())
}
