//! QueueListener: one consumer loop over a `Queue`.
//!
//! WAIT_FOR_MESSAGE -> PROCESS -> (ACK | REQUEUE) -> WAIT_FOR_MESSAGE, until
//! shutdown is signalled or lease acquisition is interrupted.
//!
//! A panicking handler counts as a failed handler.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::maintenance::MaintenanceMode;
use crate::config::ListenerConfig;
use crate::error::{CourierError, panic_message};
use crate::ports::{Clock, later_by};
use crate::queue::{Queue, QueueRecord};

/// Business logic for one queue.
#[async_trait]
pub trait MessageHandler<P: Send + Sync>: Send + Sync {
    async fn on_message(&self, record: &QueueRecord<P>) -> Result<(), CourierError>;

    /// Called with the handler's error before the record is requeued or
    /// dropped.
    async fn on_exception(&self, _error: &CourierError, _record: &QueueRecord<P>) {}
}

/// What one `poll_once` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Idle,
    Acked,
    Requeued,
    Dropped,
}

pub struct QueueListener<P>
where
    P: Clone + Send + Sync + 'static,
{
    name: String,
    queue: Arc<dyn Queue<P>>,
    handler: Arc<dyn MessageHandler<P>>,
    clock: Arc<dyn Clock>,
    maintenance: MaintenanceMode,
    config: ListenerConfig,
}

impl<P> QueueListener<P>
where
    P: Clone + Send + Sync + 'static,
{
    pub fn new(
        name: impl Into<String>,
        queue: Arc<dyn Queue<P>>,
        handler: Arc<dyn MessageHandler<P>>,
        clock: Arc<dyn Clock>,
        maintenance: MaintenanceMode,
        config: ListenerConfig,
    ) -> Self {
        Self {
            name: name.into(),
            queue,
            handler,
            clock,
            maintenance,
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run until shutdown. Returns `Err(Interrupted)` when lease acquisition
    /// was interrupted; every other failure is logged and the loop goes on.
    /// Shutdown is observed between messages and while waiting for one, never
    /// in the middle of a handler.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), CourierError> {
        info!(listener = %self.name, "listener started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            if self.maintenance.is_on() {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                }
                continue;
            }

            let fetched = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                fetched = self.fetch() => fetched,
            };

            match fetched {
                Ok(Some(record)) => {
                    self.process(record).await;
                }
                Ok(None) => {}
                Err(err) if err.is_interrupted() => {
                    warn!(listener = %self.name, "lease acquisition interrupted; stopping");
                    return Err(err);
                }
                Err(err) => {
                    warn!(listener = %self.name, error = %err, "fetching message failed");
                    tokio::select! {
                        changed = shutdown.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                }
            }
        }
        info!(listener = %self.name, "listener stopped");
        Ok(())
    }

    /// One WAIT_FOR_MESSAGE -> PROCESS step. Errors come only from the fetch;
    /// handler failures are resolved into a requeue or a drop.
    pub async fn poll_once(&self) -> Result<PollOutcome, CourierError> {
        match self.fetch().await? {
            Some(record) => Ok(self.process(record).await),
            None => Ok(PollOutcome::Idle),
        }
    }

    async fn fetch(&self) -> Result<Option<QueueRecord<P>>, CourierError> {
        self.queue
            .get_with_poll(self.config.poll_interval, self.config.wait)
            .await
    }

    async fn process(&self, record: QueueRecord<P>) -> PollOutcome {
        let id = record.id;
        debug!(
            listener = %self.name,
            record_id = ?id,
            attempts = record.attempts,
            "processing message"
        );

        match self.handle_with_renewal(&record).await {
            Ok(()) => {
                if let Err(err) = self.queue.ack(&record).await {
                    warn!(listener = %self.name, record_id = ?id, error = %err, "ack failed");
                }
                PollOutcome::Acked
            }
            Err(err) => {
                warn!(listener = %self.name, record_id = ?id, error = %err, "handler failed");
                self.handler.on_exception(&err, &record).await;

                if record.retries > 0 {
                    let delay = self.config.retry_policy.next_delay(record.attempts);
                    let earliest_get = later_by(self.clock.now(), delay);
                    match self
                        .queue
                        .requeue_with_retries(&record, record.retries - 1, earliest_get)
                        .await
                    {
                        Ok(()) => PollOutcome::Requeued,
                        Err(requeue_err) => {
                            warn!(
                                listener = %self.name,
                                record_id = ?id,
                                error = %requeue_err,
                                "requeue failed; lease will expire"
                            );
                            PollOutcome::Requeued
                        }
                    }
                } else {
                    error!(
                        listener = %self.name,
                        record_id = ?id,
                        error = %err,
                        "retries exhausted; dropping message"
                    );
                    if let Err(ack_err) = self.queue.ack(&record).await {
                        warn!(
                            listener = %self.name,
                            record_id = ?id,
                            error = %ack_err,
                            "ack of dropped message failed"
                        );
                    }
                    PollOutcome::Dropped
                }
            }
        }
    }

    /// Run the handler, renewing the lease every `lease_renew_interval`
    /// until it finishes.
    async fn handle_with_renewal(&self, record: &QueueRecord<P>) -> Result<(), CourierError> {
        let period = self.config.lease_renew_interval.max(Duration::from_millis(1));
        let mut renew = tokio::time::interval_at(Instant::now() + period, period);
        renew.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let work = AssertUnwindSafe(self.handler.on_message(record)).catch_unwind();
        tokio::pin!(work);

        loop {
            tokio::select! {
                result = &mut work => {
                    return result.unwrap_or_else(|panic| {
                        Err(CourierError::Panicked(panic_message(panic.as_ref())))
                    });
                }
                _ = renew.tick() => match self.queue.update_reset_duration(record).await {
                    Ok(true) => {}
                    Ok(false) => warn!(
                        listener = %self.name,
                        record_id = ?record.id,
                        "lease expired while processing; another consumer may receive this message"
                    ),
                    Err(err) => warn!(
                        listener = %self.name,
                        record_id = ?record.id,
                        error = %err,
                        "lease renewal failed"
                    ),
                },
            }
        }
    }
}
