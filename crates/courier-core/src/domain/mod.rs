//! Domain model: ids, perpetual task records, execution parameters, and the
//! delegate task payload.

pub mod context;
pub mod delegate_task;
pub mod ids;
pub mod names;
pub mod params;
pub mod perpetual;
pub mod response;
pub mod schedule;

pub use context::PerpetualTaskClientContext;
pub use delegate_task::DelegateTask;
pub use ids::{Id, IdMarker, PerpetualTaskId, RecordId};
pub use names::{AccountId, PerpetualTaskType, WorkerId};
pub use params::{PerpetualTaskExecutionContext, TaskParams};
pub use perpetual::{PerpetualTaskRecord, PerpetualTaskState, UnassignedReason};
pub use response::PerpetualTaskResponse;
pub use schedule::PerpetualTaskSchedule;
