use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::queue_listener::QueueListener;
use crate::error::CourierError;

/// Handle over a set of spawned [`QueueListener`]s sharing one shutdown
/// signal. Dropping the handle also stops them, since the sender goes away.
pub struct ListenerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<(String, JoinHandle<Result<(), CourierError>>)>,
}

impl ListenerGroup {
    pub fn spawn<P>(listeners: Vec<Arc<QueueListener<P>>>) -> Self
    where
        P: Clone + Send + Sync + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(listeners.len());
        for listener in listeners {
            let rx = shutdown_rx.clone();
            let name = listener.name().to_string();
            let join = tokio::spawn(async move { listener.run(rx).await });
            joins.push((name, join));
        }
        info!(listeners = joins.len(), "queue listeners started");

        Self { shutdown_tx, joins }
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    /// Stop taking new records. A handler already running finishes first.
    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    /// Request shutdown and wait for every listener. Returns how many of
    /// them stopped with an error.
    pub async fn shutdown_and_join(self) -> usize {
        self.request_shutdown();
        let mut failed = 0;
        for (name, join) in self.joins {
            match join.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    error!(listener = %name, error = %err, "listener stopped with an error");
                    failed += 1;
                }
                Err(err) => {
                    error!(listener = %name, error = %err, "listener task panicked or was aborted");
                    failed += 1;
                }
            }
        }
        failed
    }
}
