//! Ports: the seams between the scheduling core and its collaborators
//! (storage, time, id generation, the control plane as seen from a worker,
//! and remote task services).

pub mod clock;
pub mod control_plane;
pub mod id_generator;
pub mod queue_store;
pub mod store_error;
pub mod task_service_rpc;
pub mod task_store;

pub use self::clock::{Clock, FixedClock, SystemClock, earlier_by, later_by};
pub use self::control_plane::PerpetualTaskControlPlane;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::queue_store::{QueueStore, RecordFilter, RecordUpdate};
pub use self::store_error::StoreError;
pub use self::task_service_rpc::TaskServiceRpc;
pub use self::task_store::{PerpetualTaskStore, TaskFilter, TaskUpdate};
