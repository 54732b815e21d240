//! HeartbeatReaper: releases perpetual tasks whose worker went quiet.
//!
//! A task counts as quiet when neither a heartbeat nor its assignment is
//! newer than `max_heartbeat_age`. Released tasks are `TaskUnassigned` with
//! reason `HeartbeatExpired`; picking a new worker is left to the caller.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::ReaperConfig;
use crate::domain::PerpetualTaskId;
use crate::error::CourierError;
use crate::perpetual::PerpetualTaskService;
use crate::ports::{Clock, earlier_by};

pub struct HeartbeatReaper {
    service: Arc<PerpetualTaskService>,
    clock: Arc<dyn Clock>,
    config: ReaperConfig,
}

impl HeartbeatReaper {
    pub fn new(
        service: Arc<PerpetualTaskService>,
        clock: Arc<dyn Clock>,
        config: ReaperConfig,
    ) -> Self {
        Self {
            service,
            clock,
            config,
        }
    }

    pub async fn scan_once(&self) -> Result<Vec<PerpetualTaskId>, CourierError> {
        let cutoff = earlier_by(self.clock.now(), self.config.max_heartbeat_age);
        self.service.unassign_stale(cutoff).await
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let period = self.config.scan_interval.max(Duration::from_millis(1));
        loop {
            if *shutdown.borrow() {
                break;
            }
            match self.scan_once().await {
                Ok(released) if !released.is_empty() => {
                    info!(count = released.len(), "released perpetual tasks with expired heartbeats");
                }
                Ok(_) => {}
                Err(err) => warn!(error = %err, "heartbeat scan failed"),
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(period) => {}
            }
        }
    }
}
