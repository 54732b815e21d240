//! Queue implementation over a `QueueStore`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

use super::{CountFilter, Queue, QueueRecord};
use crate::config::QueueConfig;
use crate::domain::RecordId;
use crate::error::CourierError;
use crate::ports::{Clock, IdGenerator, QueueStore, RecordFilter, RecordUpdate, later_by};

/// Poll tick used by `get` when the caller does not pick one.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct DurableQueue<P>
where
    P: Send + Sync + 'static,
{
    store: Arc<dyn QueueStore<P>>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    config: QueueConfig,
    /// Wakes local `get` waiters when a record becomes available.
    available: Notify,
}

impl<P> DurableQueue<P>
where
    P: Clone + Send + Sync + 'static,
{
    pub fn new(
        store: Arc<dyn QueueStore<P>>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        config: QueueConfig,
    ) -> Self {
        Self {
            store,
            clock,
            ids,
            config,
            available: Notify::new(),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    fn require_id(record: &QueueRecord<P>, op: &'static str) -> Result<RecordId, CourierError> {
        record.id.ok_or(CourierError::NullArgument(op))
    }

    fn version_filter(&self) -> Option<String> {
        self.config
            .version_filtering
            .then(|| self.config.version.clone())
    }

    /// Single atomic lease attempt.
    async fn try_lease(&self) -> Result<Option<QueueRecord<P>>, CourierError> {
        let now = self.clock.now();
        let filter = RecordFilter::available(now).with_version(self.version_filter());
        let update = RecordUpdate::lease_until(later_by(now, self.config.reset_duration));

        let leased = self.store.find_one_and_update(&filter, &update).await?;
        if let Some(record) = &leased
            && let Some(id) = record.id
        {
            debug!(record_id = %id, attempts = record.attempts, "leased record");
        }
        Ok(leased)
    }

    async fn release(
        &self,
        record: &QueueRecord<P>,
        update: RecordUpdate,
    ) -> Result<(), CourierError> {
        let id = Self::require_id(record, "requeue: record")?;
        let matched = self
            .store
            .update_one(&RecordFilter::by_id(id), &update)
            .await?;
        if matched {
            self.available.notify_waiters();
        } else {
            debug!(record_id = %id, "requeue of a record that is no longer stored");
        }
        Ok(())
    }
}

#[async_trait]
impl<P> Queue<P> for DurableQueue<P>
where
    P: Clone + Send + Sync + 'static,
{
    async fn send(&self, mut record: QueueRecord<P>) -> Result<QueueRecord<P>, CourierError> {
        let id = self.ids.generate_record_id();
        record.id = Some(id);
        record.created = self.clock.now();
        record.reset_timestamp = None;
        record.attempts = 0;
        if record.version.is_none() {
            record.version = Some(self.config.version.clone());
        }

        self.store.insert(record.clone()).await?;
        debug!(record_id = %id, priority = record.priority, "sent record");
        self.available.notify_waiters();
        Ok(record)
    }

    async fn get(&self, wait: Duration) -> Result<Option<QueueRecord<P>>, CourierError> {
        self.get_with_poll(DEFAULT_POLL_INTERVAL, wait).await
    }

    async fn get_with_poll(
        &self,
        poll_interval: Duration,
        wait: Duration,
    ) -> Result<Option<QueueRecord<P>>, CourierError> {
        let poll_interval = poll_interval.max(self.config.min_poll_interval);
        // an unrepresentable deadline means wait indefinitely
        let deadline = Instant::now().checked_add(wait);

        loop {
            if let Some(record) = self.try_lease().await? {
                return Ok(Some(record));
            }

            let tick = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(None);
                    }
                    poll_interval.min(deadline - now)
                }
                None => poll_interval,
            };
            tokio::select! {
                _ = tokio::time::sleep(tick) => {}
                _ = self.available.notified() => {}
            }
        }
    }

    async fn ack(&self, record: &QueueRecord<P>) -> Result<(), CourierError> {
        let id = Self::require_id(record, "ack: record")?;
        if !self.store.delete_one(&RecordFilter::by_id(id)).await? {
            debug!(record_id = %id, "ack of a record that is already gone");
        }
        Ok(())
    }

    async fn ack_send(
        &self,
        old: &QueueRecord<P>,
        mut new: QueueRecord<P>,
    ) -> Result<QueueRecord<P>, CourierError> {
        let id = Self::require_id(old, "ack_send: old record")?;
        new.id = Some(id);
        new.created = self.clock.now();
        new.reset_timestamp = None;
        if new.version.is_none() {
            new.version = Some(self.config.version.clone());
        }

        self.store.upsert(new.clone()).await?;
        debug!(record_id = %id, "replaced record");
        self.available.notify_waiters();
        Ok(new)
    }

    async fn requeue(&self, record: &QueueRecord<P>) -> Result<(), CourierError> {
        self.requeue_with_priority(record, self.clock.now(), record.priority)
            .await
    }

    async fn requeue_at(
        &self,
        record: &QueueRecord<P>,
        earliest_get: DateTime<Utc>,
    ) -> Result<(), CourierError> {
        self.requeue_with_priority(record, earliest_get, record.priority)
            .await
    }

    async fn requeue_with_priority(
        &self,
        record: &QueueRecord<P>,
        earliest_get: DateTime<Utc>,
        priority: f64,
    ) -> Result<(), CourierError> {
        Self::require_id(record, "requeue: record")?;
        if priority.is_nan() {
            return Err(CourierError::InvalidArgument(
                "requeue: priority must not be NaN".to_string(),
            ));
        }
        self.release(record, RecordUpdate::release(earliest_get, priority))
            .await
    }

    async fn requeue_with_retries(
        &self,
        record: &QueueRecord<P>,
        retries: u32,
        earliest_get: DateTime<Utc>,
    ) -> Result<(), CourierError> {
        let update = RecordUpdate::release(earliest_get, record.priority).with_retries(retries);
        self.release(record, update).await
    }

    async fn count(&self, filter: CountFilter) -> Result<u64, CourierError> {
        let version = self.version_filter();
        let all = RecordFilter::all().with_version(version.clone());
        let running = RecordFilter::leased(self.clock.now()).with_version(version);

        let count = match filter {
            CountFilter::All => self.store.count(&all).await?,
            CountFilter::Running => self.store.count(&running).await?,
            CountFilter::NotRunning => {
                let total = self.store.count(&all).await?;
                total.saturating_sub(self.store.count(&running).await?)
            }
        };
        Ok(count)
    }

    async fn update_reset_duration(&self, record: &QueueRecord<P>) -> Result<bool, CourierError> {
        let id = Self::require_id(record, "update_reset_duration: record")?;
        let now = self.clock.now();
        let extended = self
            .store
            .update_one(
                &RecordFilter::leased(now)
                    .with_id(id)
                    .with_attempts(record.attempts),
                &RecordUpdate::extend_lease(later_by(now, self.config.reset_duration)),
            )
            .await?;
        if extended {
            debug!(record_id = %id, "renewed lease");
        } else {
            debug!(record_id = %id, "lease expired or re-leased; not renewed");
        }
        Ok(extended)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::impls::InMemoryQueueStore;
    use crate::ports::{FixedClock, UlidGenerator};
    use chrono::TimeZone;

    const LEASE: Duration = Duration::from_secs(60);

    struct Harness {
        clock: Arc<FixedClock>,
        store: Arc<InMemoryQueueStore<String>>,
        queue: DurableQueue<String>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_config(QueueConfig::default().with_reset_duration(LEASE))
        }

        fn with_config(config: QueueConfig) -> Self {
            let clock = Arc::new(FixedClock::new(
                Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            ));
            let store = Arc::new(InMemoryQueueStore::new());
            let queue = Self::queue_on(&clock, &store, config);
            Self {
                clock,
                store,
                queue,
            }
        }

        /// Another consumer sharing the same store and clock.
        fn peer(&self, config: QueueConfig) -> DurableQueue<String> {
            Self::queue_on(&self.clock, &self.store, config)
        }

        fn queue_on(
            clock: &Arc<FixedClock>,
            store: &Arc<InMemoryQueueStore<String>>,
            config: QueueConfig,
        ) -> DurableQueue<String> {
            DurableQueue::new(
                store.clone(),
                clock.clone(),
                Arc::new(UlidGenerator::new(clock.clone())),
                config,
            )
        }

        async fn send(&self, payload: &str) -> QueueRecord<String> {
            self.queue
                .send(QueueRecord::new(payload.to_string()))
                .await
                .unwrap()
        }

        async fn get_now(&self) -> Option<QueueRecord<String>> {
            self.queue.get(Duration::ZERO).await.unwrap()
        }
    }

    #[tokio::test]
    async fn send_assigns_id_created_and_version() {
        let h = Harness::new();
        let sent = h.send("a").await;

        assert!(sent.id.is_some());
        assert_eq!(sent.created, h.clock.now());
        assert_eq!(sent.version.as_deref(), Some(h.queue.config().version.as_str()));
        assert_eq!(h.queue.count(CountFilter::All).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn send_keeps_explicit_version() {
        let h = Harness::new();
        let sent = h
            .queue
            .send(QueueRecord::new("a".to_string()).with_version("0.9.0"))
            .await
            .unwrap();
        assert_eq!(sent.version.as_deref(), Some("0.9.0"));
    }

    #[tokio::test]
    async fn only_one_concurrent_get_receives_the_record() {
        let h = Harness::new();
        h.send("only").await;
        let queue = Arc::new(h.queue);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let queue = queue.clone();
                tokio::spawn(async move { queue.get(Duration::ZERO).await.unwrap() })
            })
            .collect();

        let mut received = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                received += 1;
            }
        }
        assert_eq!(received, 1);
    }

    #[tokio::test]
    async fn lower_priority_is_served_first() {
        let h = Harness::new();
        for (payload, priority) in [("p3", 0.3), ("p5", 0.5), ("p4", 0.4)] {
            h.queue
                .send(QueueRecord::new(payload.to_string()).with_priority(priority))
                .await
                .unwrap();
        }

        let mut order = Vec::new();
        while let Some(record) = h.get_now().await {
            order.push(record.priority);
        }
        assert_eq!(order, vec![0.3, 0.4, 0.5]);
    }

    #[tokio::test]
    async fn equal_priority_is_fifo() {
        let h = Harness::new();
        for payload in ["A", "B", "C"] {
            h.send(payload).await;
        }

        let mut order = Vec::new();
        while let Some(record) = h.get_now().await {
            order.push(record.payload);
        }
        assert_eq!(order, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn leased_record_is_hidden_until_the_lease_expires() {
        let h = Harness::new();
        let sent = h.send("m").await;

        let leased = h.get_now().await.unwrap();
        assert_eq!(leased.id, sent.id);
        assert_eq!(leased.attempts, 1);
        assert_eq!(
            leased.reset_timestamp,
            Some(h.clock.now() + chrono::Duration::seconds(60))
        );
        assert!(h.get_now().await.is_none());

        h.clock.advance(LEASE);
        let again = h.get_now().await.unwrap();
        assert_eq!(again.id, sent.id);
        assert_eq!(again.attempts, 2);
    }

    #[tokio::test]
    async fn acked_record_is_never_returned() {
        let h = Harness::new();
        h.send("m").await;
        let leased = h.get_now().await.unwrap();

        h.queue.ack(&leased).await.unwrap();
        h.queue.ack(&leased).await.unwrap();

        h.clock.advance(LEASE * 2);
        assert!(h.get_now().await.is_none());
        assert_eq!(h.queue.count(CountFilter::All).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn ack_send_replaces_under_the_same_id() {
        let h = Harness::new();
        let old = h.send("v1").await;
        let leased = h.get_now().await.unwrap();
        h.clock.advance(Duration::from_secs(5));

        let later = h.clock.now() + chrono::Duration::seconds(30);
        let replaced = h
            .queue
            .ack_send(
                &leased,
                QueueRecord::new("v2".to_string())
                    .with_priority(0.1)
                    .with_earliest_get(later),
            )
            .await
            .unwrap();

        assert_eq!(replaced.id, old.id);
        assert_eq!(replaced.created, h.clock.now());
        assert_eq!(h.queue.count(CountFilter::All).await.unwrap(), 1);
        assert!(h.get_now().await.is_none());

        h.clock.advance(Duration::from_secs(30));
        let next = h.get_now().await.unwrap();
        assert_eq!(next.id, old.id);
        assert_eq!(next.payload, "v2");
        assert_eq!(next.priority, 0.1);
        assert_eq!(next.earliest_get, later);
    }

    #[tokio::test]
    async fn requeue_rejects_nan_priority() {
        let h = Harness::new();
        h.send("m").await;
        let leased = h.get_now().await.unwrap();

        let err = h
            .queue
            .requeue_with_priority(&leased, h.clock.now(), f64::NAN)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(h.queue.count(CountFilter::Running).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unsent_records_are_null_arguments() {
        let h = Harness::new();
        let unsent = QueueRecord::new("ghost".to_string());

        for err in [
            h.queue.ack(&unsent).await.unwrap_err(),
            h.queue.requeue(&unsent).await.unwrap_err(),
            h.queue
                .requeue_with_priority(&unsent, h.clock.now(), f64::NAN)
                .await
                .unwrap_err(),
            h.queue.update_reset_duration(&unsent).await.unwrap_err(),
            h.queue
                .ack_send(&unsent, QueueRecord::new("x".to_string()))
                .await
                .unwrap_err(),
        ] {
            assert_eq!(err.kind(), ErrorKind::NullArgument);
        }
        assert_eq!(h.queue.count(CountFilter::All).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn requeue_keeps_created_and_releases_the_lease() {
        let h = Harness::new();
        let first = h.send("first").await;
        h.clock.advance(Duration::from_secs(1));
        h.send("second").await;

        let leased = h.get_now().await.unwrap();
        assert_eq!(leased.id, first.id);
        h.queue.requeue(&leased).await.unwrap();

        let again = h.get_now().await.unwrap();
        assert_eq!(again.id, first.id);
        assert_eq!(again.created, first.created);
    }

    #[tokio::test]
    async fn requeue_with_retries_sets_budget_and_delay() {
        let h = Harness::new();
        h.queue
            .send(QueueRecord::new("m".to_string()).with_retries(3))
            .await
            .unwrap();
        let leased = h.get_now().await.unwrap();

        let retry_at = h.clock.now() + chrono::Duration::seconds(10);
        h.queue
            .requeue_with_retries(&leased, leased.retries - 1, retry_at)
            .await
            .unwrap();
        assert!(h.get_now().await.is_none());

        h.clock.advance(Duration::from_secs(10));
        assert_eq!(h.get_now().await.unwrap().retries, 2);
    }

    #[tokio::test]
    async fn future_earliest_get_delays_delivery() {
        let h = Harness::new();
        let at = h.clock.now() + chrono::Duration::seconds(45);
        h.queue
            .send(QueueRecord::new("later".to_string()).with_earliest_get(at))
            .await
            .unwrap();

        assert!(h.get_now().await.is_none());
        h.clock.advance(Duration::from_secs(44));
        assert!(h.get_now().await.is_none());
        h.clock.advance(Duration::from_secs(1));
        assert!(h.get_now().await.is_some());
    }

    #[tokio::test]
    async fn version_filtering_isolates_producer_versions() {
        let h = Harness::with_config(QueueConfig::default().with_version("1.0.0"));
        h.send("from-1.0.0").await;

        let filtered = h.peer(
            QueueConfig::default()
                .with_version("2.0.0")
                .with_version_filtering(true),
        );
        assert!(filtered.get(Duration::ZERO).await.unwrap().is_none());
        assert_eq!(filtered.count(CountFilter::All).await.unwrap(), 0);

        let unfiltered = h.peer(QueueConfig::default().with_version("2.0.0"));
        let record = unfiltered.get(Duration::ZERO).await.unwrap().unwrap();
        assert_eq!(record.payload, "from-1.0.0");
    }

    #[tokio::test]
    async fn lease_renewal_only_extends_active_leases() {
        let h = Harness::new();
        h.send("m").await;
        let leased = h.get_now().await.unwrap();

        h.clock.advance(Duration::from_secs(30));
        assert!(h.queue.update_reset_duration(&leased).await.unwrap());
        h.clock.advance(Duration::from_secs(45));
        assert!(h.get_now().await.is_none());

        h.clock.advance(Duration::from_secs(15));
        assert!(!h.queue.update_reset_duration(&leased).await.unwrap());
        let stolen = h.get_now().await.unwrap();
        assert_eq!(stolen.id, leased.id);
        assert_eq!(stolen.attempts, 2);
    }

    #[tokio::test]
    async fn renewal_from_a_superseded_holder_is_refused() {
        let h = Harness::new();
        h.send("m").await;
        let held_by_a = h.get_now().await.unwrap();

        h.clock.advance(Duration::from_secs(61));
        let held_by_b = h.get_now().await.unwrap();
        assert_eq!(held_by_b.id, held_by_a.id);

        h.clock.advance(Duration::from_secs(5));
        assert!(!h.queue.update_reset_duration(&held_by_a).await.unwrap());
        assert!(h.queue.update_reset_duration(&held_by_b).await.unwrap());

        // B renewed at +66s, so its lease runs to +126s rather than +121s.
        h.clock.advance(Duration::from_secs(57));
        assert!(h.get_now().await.is_none());
        h.clock.advance(Duration::from_secs(4));
        assert_eq!(h.get_now().await.unwrap().id, held_by_a.id);
    }

    #[tokio::test]
    async fn count_splits_running_and_not_running() {
        let h = Harness::new();
        for payload in ["a", "b", "c"] {
            h.send(payload).await;
        }
        h.get_now().await.unwrap();

        assert_eq!(h.queue.count(CountFilter::All).await.unwrap(), 3);
        assert_eq!(h.queue.count(CountFilter::Running).await.unwrap(), 1);
        assert_eq!(h.queue.count(CountFilter::NotRunning).await.unwrap(), 2);

        h.clock.advance(LEASE);
        assert_eq!(h.queue.count(CountFilter::Running).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn get_returns_none_at_the_deadline() {
        let h = Harness::new();
        let wait = Duration::from_millis(50);

        let started = std::time::Instant::now();
        let got = h.queue.get_with_poll(Duration::ZERO, wait).await.unwrap();
        assert!(got.is_none());
        assert!(started.elapsed() >= wait);
    }

    #[tokio::test]
    async fn waiting_get_is_woken_by_send() {
        let h = Harness::new();
        let queue = Arc::new(h.queue);

        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move {
                queue
                    .get_with_poll(Duration::from_secs(10), Duration::from_secs(10))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue
            .send(QueueRecord::new("wake".to_string()))
            .await
            .unwrap();

        let got = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .expect("waiter should be woken well before its poll tick")
            .unwrap()
            .unwrap();
        assert_eq!(got.unwrap().payload, "wake");
    }
}
