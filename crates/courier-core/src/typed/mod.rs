//! Typed executor API.
//!
//! - Surface: `TaskParamsKind`, `PerpetualTaskExecutor<T>`. A params struct
//!   and its executor are paired at compile time.
//! - Inside: `DynExecutor`, object-safe, stored in `ExecutorRegistry` and
//!   looked up by the `task_type` tag of the incoming `TaskParams`.

pub mod executor;
pub mod params;
pub mod registry;

pub use self::executor::{DynExecutor, PerpetualTaskExecutor, TypedExecutor};
pub use self::params::TaskParamsKind;
pub use self::registry::{ExecutorRegistry, RegistryError};
