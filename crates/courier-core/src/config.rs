use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::queue::RetryPolicy;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

/// Version stamped on records by producers that do not set one.
pub const BUILD_VERSION: &str = env!("CARGO_PKG_VERSION");

// ── Lookup helpers ────────────────────────────────────────────

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn opt(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    fn string_or(&self, key: &str, default: &str) -> String {
        self.opt(key).unwrap_or_else(|| default.to_string())
    }

    fn u64_or(&self, key: &str, default: u64) -> u64 {
        self.opt(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn f64_or(&self, key: &str, default: f64) -> f64 {
        self.opt(key)
            .and_then(|v| v.trim().parse().ok())
            .filter(|v: &f64| v.is_finite())
            .unwrap_or(default)
    }

    fn bool_or(&self, key: &str, default: bool) -> bool {
        match self.opt(key).map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
            Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
            _ => default,
        }
    }

    fn millis_or(&self, key: &str, default: Duration) -> Duration {
        Duration::from_millis(self.u64_or(key, default.as_millis() as u64))
    }

    fn secs_or(&self, key: &str, default: Duration) -> Duration {
        Duration::from_secs(self.u64_or(key, default.as_secs()))
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CourierConfig {
    pub queue: QueueConfig,
    pub listener: ListenerConfig,
    pub worker: WorkerConfig,
    pub reaper: ReaperConfig,
}

impl CourierConfig {
    /// Build config from `COURIER_*` environment variables
    /// (call `load_dotenv()` first). Unset or unparsable values fall back to
    /// the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };
        Self {
            queue: QueueConfig::from_env(&env),
            listener: ListenerConfig::from_env(&env),
            worker: WorkerConfig::from_env(&env),
            reaper: ReaperConfig::from_env(&env),
        }
    }
}

// ── Queue ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Lease duration granted by `get` and by each renewal.
    pub reset_duration: Duration,
    /// Version of this process; stamped on sent records and compared on
    /// `get` when filtering is on.
    pub version: String,
    pub version_filtering: bool,
    /// Floor applied to any poll interval passed to `get`.
    pub min_poll_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            reset_duration: Duration::from_secs(300),
            version: BUILD_VERSION.to_string(),
            version_filtering: false,
            min_poll_interval: Duration::from_millis(10),
        }
    }
}

impl QueueConfig {
    fn from_env<F: Fn(&str) -> Option<String>>(env: &Env<F>) -> Self {
        let d = Self::default();
        Self {
            reset_duration: env.secs_or("COURIER_QUEUE_RESET_DURATION_SECS", d.reset_duration),
            version: env.string_or("COURIER_VERSION", &d.version),
            version_filtering: env.bool_or("COURIER_QUEUE_VERSION_FILTERING", d.version_filtering),
            min_poll_interval: env.millis_or("COURIER_QUEUE_MIN_POLL_MS", d.min_poll_interval),
        }
    }

    pub fn with_reset_duration(mut self, reset_duration: Duration) -> Self {
        self.reset_duration = reset_duration;
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_version_filtering(mut self, enabled: bool) -> Self {
        self.version_filtering = enabled;
        self
    }
}

// ── Listener ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// Bound on a single blocking `get`.
    pub wait: Duration,
    pub poll_interval: Duration,
    /// How often the lease is renewed while a handler runs. Keep it well
    /// under the queue's reset duration.
    pub lease_renew_interval: Duration,
    /// Backoff applied to `earliest_get` when a failed message is requeued.
    pub retry_policy: RetryPolicy,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            wait: Duration::from_secs(1),
            poll_interval: Duration::from_millis(100),
            lease_renew_interval: Duration::from_secs(60),
            retry_policy: RetryPolicy::immediate(),
        }
    }
}

impl ListenerConfig {
    fn from_env<F: Fn(&str) -> Option<String>>(env: &Env<F>) -> Self {
        let d = Self::default();
        Self {
            wait: env.millis_or("COURIER_LISTENER_WAIT_MS", d.wait),
            poll_interval: env.millis_or("COURIER_LISTENER_POLL_MS", d.poll_interval),
            lease_renew_interval: env
                .secs_or("COURIER_LISTENER_LEASE_RENEW_SECS", d.lease_renew_interval),
            retry_policy: RetryPolicy {
                base_delay: env.millis_or(
                    "COURIER_LISTENER_RETRY_BASE_MS",
                    d.retry_policy.base_delay,
                ),
                multiplier: env.f64_or(
                    "COURIER_LISTENER_RETRY_MULTIPLIER",
                    d.retry_policy.multiplier,
                ),
            },
        }
    }
}

// ── Perpetual task worker ─────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Period of the outer tick that refreshes the assigned task set.
    pub assignment_poll_interval: Duration,
    /// Bound on a client's `on_task_state_change` hook.
    pub state_change_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            assignment_poll_interval: Duration::from_secs(10),
            state_change_timeout: Duration::from_secs(5),
        }
    }
}

impl WorkerConfig {
    fn from_env<F: Fn(&str) -> Option<String>>(env: &Env<F>) -> Self {
        let d = Self::default();
        Self {
            assignment_poll_interval: env
                .secs_or("COURIER_WORKER_POLL_SECS", d.assignment_poll_interval),
            state_change_timeout: env
                .millis_or("COURIER_STATE_CHANGE_TIMEOUT_MS", d.state_change_timeout),
        }
    }
}

// ── Heartbeat reaper ──────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReaperConfig {
    /// Assigned tasks silent for longer than this are unassigned.
    pub max_heartbeat_age: Duration,
    pub scan_interval: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            max_heartbeat_age: Duration::from_secs(180),
            scan_interval: Duration::from_secs(60),
        }
    }
}

impl ReaperConfig {
    fn from_env<F: Fn(&str) -> Option<String>>(env: &Env<F>) -> Self {
        let d = Self::default();
        Self {
            max_heartbeat_age: env.secs_or("COURIER_HEARTBEAT_MAX_AGE_SECS", d.max_heartbeat_age),
            scan_interval: env.secs_or("COURIER_REAPER_SCAN_SECS", d.scan_interval),
        }
    }
}
