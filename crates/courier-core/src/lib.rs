//! courier-core
//!
//! Building blocks for lease-based work distribution.
//!
//! - **queue**: durable priority queue with time-bounded leases
//!   (`DurableQueue` over a `QueueStore`).
//! - **perpetual**: registry of recurring tasks, the per-type client
//!   contract, and the in-process control plane.
//! - **typed**: typed executors keyed by their parameter type.
//! - **app**: listener loops, the perpetual task worker, the heartbeat reaper.
//! - **domain** / **ports** / **impls**: model, seams, in-memory and HTTP
//!   adapters.

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod perpetual;
pub mod ports;
pub mod queue;
pub mod typed;

pub use error::{CourierError, ErrorKind};
