//! Result of one perpetual task execution, as reported by the worker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PerpetualTaskState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerpetualTaskResponse {
    /// HTTP-like status: 200 on success.
    pub response_code: u16,
    pub response_message: String,
    pub state: PerpetualTaskState,
    pub reported_at: DateTime<Utc>,
}

impl PerpetualTaskResponse {
    pub const OK: u16 = 200;
    pub const FAILED: u16 = 500;
    pub const TIMED_OUT: u16 = 504;

    pub fn success(reported_at: DateTime<Utc>) -> Self {
        Self {
            response_code: Self::OK,
            response_message: "success".to_string(),
            state: PerpetualTaskState::TaskAssigned,
            reported_at,
        }
    }

    pub fn failure(message: impl Into<String>, reported_at: DateTime<Utc>) -> Self {
        Self {
            response_code: Self::FAILED,
            response_message: message.into(),
            state: PerpetualTaskState::TaskFailed,
            reported_at,
        }
    }

    pub fn timed_out(message: impl Into<String>, reported_at: DateTime<Utc>) -> Self {
        Self {
            response_code: Self::TIMED_OUT,
            response_message: message.into(),
            state: PerpetualTaskState::TaskFailed,
            reported_at,
        }
    }

    pub fn invalid(message: impl Into<String>, reported_at: DateTime<Utc>) -> Self {
        Self {
            response_code: Self::FAILED,
            response_message: message.into(),
            state: PerpetualTaskState::TaskInvalid,
            reported_at,
        }
    }

    pub fn is_success(&self) -> bool {
        self.response_code == Self::OK
    }
}
