use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Process-wide maintenance switch. Listeners do not dequeue while it is on.
#[derive(Debug, Clone, Default)]
pub struct MaintenanceMode {
    on: Arc<AtomicBool>,
}

impl MaintenanceMode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, on: bool) {
        self.on.store(on, Ordering::SeqCst);
    }

    pub fn is_on(&self) -> bool {
        self.on.load(Ordering::SeqCst)
    }
}
