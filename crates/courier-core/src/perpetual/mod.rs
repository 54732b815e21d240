//! Perpetual tasks, control-plane side: the registry service, the per-type
//! client contract, and the views a worker consumes.

pub mod client;
pub mod control_plane;
pub mod remote;
pub mod service;

pub use self::client::{ClientParams, PerpetualTaskClientRegistry, PerpetualTaskServiceClient};
pub use self::control_plane::LocalControlPlane;
pub use self::remote::RemotePerpetualTaskClient;
pub use self::service::PerpetualTaskService;
