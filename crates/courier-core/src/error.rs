use std::any::Any;
use std::time::Duration;

use thiserror::Error;

use crate::domain::PerpetualTaskType;
use crate::ports::StoreError;

/// Operational classification of a [`CourierError`].
///
/// - `InvalidArgument` / `NullArgument`: rejected before any mutation.
/// - `NotFound`: the addressed record does not exist.
/// - `Transient`: recovered locally (requeue, state-change hook, retry next tick).
/// - `Fatal`: the consuming loop must stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    NullArgument,
    NotFound,
    Transient,
    Fatal,
}

#[derive(Debug, Error)]
pub enum CourierError {
    #[error("null argument: {0}")]
    NullArgument(&'static str),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("no perpetual task client registered for task_type={0}")]
    ClientNotFound(PerpetualTaskType),

    #[error("duplicate perpetual task client for task_type={0}")]
    DuplicateClient(PerpetualTaskType),

    #[error("no executor registered for params type={0}")]
    ExecutorNotFound(String),

    #[error("interrupted")]
    Interrupted,

    #[error("store error: {0}")]
    Store(StoreError),

    #[error("remote call failed: {0}")]
    Remote(String),

    #[error("payload decode: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("handler failed: {0}")]
    Handler(String),

    #[error("panicked: {0}")]
    Panicked(String),
}

impl CourierError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CourierError::NullArgument(_) => ErrorKind::NullArgument,
            CourierError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            CourierError::NotFound(_)
            | CourierError::ClientNotFound(_)
            | CourierError::ExecutorNotFound(_) => ErrorKind::NotFound,
            CourierError::Interrupted => ErrorKind::Fatal,
            CourierError::DuplicateClient(_)
            | CourierError::Store(_)
            | CourierError::Remote(_)
            | CourierError::Decode(_)
            | CourierError::Timeout(_)
            | CourierError::Handler(_)
            | CourierError::Panicked(_) => ErrorKind::Transient,
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, CourierError::Interrupted)
    }
}

/// Text of a payload caught with `catch_unwind`.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl From<StoreError> for CourierError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Interrupted => CourierError::Interrupted,
            other => CourierError::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_interruption_becomes_fatal() {
        let err: CourierError = StoreError::Interrupted.into();
        assert!(err.is_interrupted());
        assert_eq!(err.kind(), ErrorKind::Fatal);
    }

    #[test]
    fn unavailable_store_is_transient() {
        let err: CourierError = StoreError::Unavailable("down".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::Transient);
        assert!(err.to_string().contains("down"));
    }

    #[test]
    fn missing_client_is_not_found() {
        let err = CourierError::ClientNotFound(PerpetualTaskType::new("K8S_WATCH"));
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().contains("K8S_WATCH"));
    }

    #[test]
    fn panic_payload_text_is_recovered() {
        let caught = std::panic::catch_unwind(|| panic!("lost {}", "lease")).unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "lost lease");
        let caught = std::panic::catch_unwind(|| std::panic::panic_any(7u8)).unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "unknown panic");
    }
}
