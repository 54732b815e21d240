//! String-backed names owned by collaborators outside this crate.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_name {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }
    };
}

string_name!(
    /// Tenant scope of a perpetual task.
    AccountId
);

string_name!(
    /// Identity of a delegate (worker process).
    WorkerId
);

string_name!(
    /// Selects the `PerpetualTaskServiceClient` responsible for a task,
    /// e.g. `K8S_WATCH` or `AWS_ECS_INSTANCE_SYNC`.
    PerpetualTaskType
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_display_their_value() {
        assert_eq!(AccountId::new("acc-1").to_string(), "acc-1");
        assert_eq!(WorkerId::from("delegate-7").as_str(), "delegate-7");
    }

    #[test]
    fn names_serialize_as_plain_strings() {
        let json = serde_json::to_string(&PerpetualTaskType::new("K8S_WATCH")).unwrap();
        assert_eq!(json, "\"K8S_WATCH\"");
    }
}
