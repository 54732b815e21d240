//! IdGenerator port.
//!
//! Ids are ULIDs whose timestamp part comes from the injected clock, so
//! they sort by creation time and can be produced on any node without
//! coordination.

use crate::domain::{PerpetualTaskId, RecordId};
use crate::ports::Clock;
use ulid::Ulid;

pub trait IdGenerator: Send + Sync {
    fn generate_record_id(&self) -> RecordId;

    fn generate_perpetual_task_id(&self) -> PerpetualTaskId;
}

pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_record_id(&self) -> RecordId {
        RecordId::from(self.next_ulid())
    }

    fn generate_perpetual_task_id(&self) -> PerpetualTaskId {
        PerpetualTaskId::from(self.next_ulid())
    }
}
