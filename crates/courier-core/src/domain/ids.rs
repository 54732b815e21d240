//! Strongly-typed identifiers.
//!
//! Every id is a ULID wrapped in `Id<T>`, where `T` is a zero-sized marker.
//! A `RecordId` and a `PerpetualTaskId` therefore cannot be mixed up, while
//! sharing one implementation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use ulid::Ulid;

/// Marker trait providing the display prefix of an id type.
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// Accepts both the prefixed display form and a bare ULID.
impl<T: IdMarker> FromStr for Id<T> {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix(T::prefix()).unwrap_or(s);
        Ulid::from_string(raw).map(Self::from_ulid)
    }
}

/// Queue record marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Record {}

impl IdMarker for Record {
    fn prefix() -> &'static str {
        "rec-"
    }
}

/// Perpetual task marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PerpetualTask {}

impl IdMarker for PerpetualTask {
    fn prefix() -> &'static str {
        "pt-"
    }
}

/// Identifier of a durable queue record, stable across re-delivery.
pub type RecordId = Id<Record>;

/// Identifier of a perpetual task registration.
pub type PerpetualTaskId = Id<PerpetualTask>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_type_prefix() {
        let ulid = Ulid::new();
        let record = RecordId::from_ulid(ulid);
        let task = PerpetualTaskId::from_ulid(ulid);

        assert!(record.to_string().starts_with("rec-"));
        assert!(task.to_string().starts_with("pt-"));
        assert_eq!(record.as_ulid(), task.as_ulid());
    }

    #[test]
    fn parses_prefixed_and_bare_forms() {
        let id = PerpetualTaskId::from_ulid(Ulid::new());
        let prefixed: PerpetualTaskId = id.to_string().parse().unwrap();
        let bare: PerpetualTaskId = id.as_ulid().to_string().parse().unwrap();
        assert_eq!(prefixed, id);
        assert_eq!(bare, id);
        assert!("pt-not-a-ulid".parse::<PerpetualTaskId>().is_err());
    }

    #[test]
    fn serializes_as_bare_ulid_string() {
        let id = RecordId::from_ulid(Ulid::new());
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.as_ulid()));
        let back: RecordId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn phantom_marker_is_zero_sized() {
        assert_eq!(std::mem::size_of::<RecordId>(), std::mem::size_of::<Ulid>());
    }
}
