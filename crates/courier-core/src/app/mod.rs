//! App layer: the long-running loops built on top of the queue and the
//! perpetual task registry.
//!
//! - **QueueListener** / **ListenerGroup**: lease, handle, ack or requeue.
//! - **PerpetualTaskWorker** / **WorkerBuilder**: worker-side scheduling of
//!   assigned perpetual tasks.
//! - **HeartbeatReaper**: releases tasks whose worker went quiet.

pub mod builder;
pub mod listener_group;
pub mod maintenance;
pub mod perpetual_worker;
pub mod queue_listener;
pub mod reaper_loop;
pub mod status;

pub use self::builder::{BuildError, WorkerBuilder};
pub use self::listener_group::ListenerGroup;
pub use self::maintenance::MaintenanceMode;
pub use self::perpetual_worker::PerpetualTaskWorker;
pub use self::queue_listener::{MessageHandler, PollOutcome, QueueListener};
pub use self::reaper_loop::HeartbeatReaper;
pub use self::status::QueueStatus;
