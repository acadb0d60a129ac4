use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;

/// Length in bytes of an event reference digest.
pub const REF_LEN: usize = 32;

/// Content-addressed reference to an event.
///
/// An `EventRef` is the BLAKE3 digest of an event's canonical field subset.
/// Two events with identical canonical content always share a reference.
/// The external representation is a lowercase hex string; the "no reference"
/// case is modelled as `Option<EventRef>::None` rather than a zero-length
/// sentinel value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventRef([u8; REF_LEN]);

impl EventRef {
    /// Create an `EventRef` from a pre-computed digest.
    pub const fn from_hash(hash: [u8; REF_LEN]) -> Self {
        Self(hash)
    }

    /// Digest arbitrary bytes without domain separation.
    pub fn digest(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// The raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; REF_LEN] {
        &self.0
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        let arr: [u8; REF_LEN] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| TypeError::InvalidLength {
                expected: REF_LEN,
                actual: bytes.len(),
            })?;
        Ok(Self(arr))
    }

    /// Parse an optional reference where an empty string means "none".
    pub fn parse_optional(s: &str) -> Result<Option<Self>, TypeError> {
        if s.is_empty() {
            Ok(None)
        } else {
            Self::from_hex(s).map(Some)
        }
    }
}

impl fmt::Debug for EventRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventRef({})", self.short_hex())
    }
}

impl fmt::Display for EventRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for EventRef {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<[u8; REF_LEN]> for EventRef {
    fn from(bytes: [u8; REF_LEN]) -> Self {
        Self(bytes)
    }
}

impl Serialize for EventRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for EventRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Serde helper for `Option<EventRef>` fields where older writers emitted an
/// empty string instead of omitting the field.
pub mod optional_ref {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::EventRef;

    pub fn serialize<S>(value: &Option<EventRef>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(r) => serializer.serialize_str(&r.to_hex()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<EventRef>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(s) => EventRef::parse_optional(&s).map_err(serde::de::Error::custom),
        }
    }
}
