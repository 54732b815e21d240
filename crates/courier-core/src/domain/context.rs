//! Client context: the opaque parameter bundle stored with a perpetual task.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Opaque key/value parameters plus a monotonically increasing
/// "last updated" marker.
///
/// Only the task type's client interprets `client_params`. Together with the
/// account and the task type this is the dedup key of a registration, so the
/// map is ordered to make equality and hashing independent of insertion
/// order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PerpetualTaskClientContext {
    #[serde(default)]
    pub client_params: BTreeMap<String, String>,

    /// Milliseconds since epoch of the last context change.
    #[serde(default)]
    pub last_context_updated: i64,
}

impl PerpetualTaskClientContext {
    pub fn new(client_params: BTreeMap<String, String>) -> Self {
        Self {
            client_params,
            last_context_updated: 0,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.client_params.insert(key.into(), value.into());
        self
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.client_params.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ignores_insertion_order() {
        let a = PerpetualTaskClientContext::default()
            .with_param("cluster", "c1")
            .with_param("namespace", "ns");
        let b = PerpetualTaskClientContext::default()
            .with_param("namespace", "ns")
            .with_param("cluster", "c1");
        assert_eq!(a, b);
        assert_eq!(a.param("cluster"), Some("c1"));
    }
}
