//! Impls: adapters for the ports.
//!
//! - **InMemoryQueueStore**: `QueueStore` for tests and single-process setups
//! - **InMemoryPerpetualTaskStore**: `PerpetualTaskStore` with the dedup constraint
//! - **HttpTaskServiceRpc**: `TaskServiceRpc` over HTTP/JSON

pub mod http_task_service;
pub mod inmem_queue_store;
pub mod inmem_task_store;

pub use self::http_task_service::HttpTaskServiceRpc;
pub use self::inmem_queue_store::InMemoryQueueStore;
pub use self::inmem_task_store::InMemoryPerpetualTaskStore;
