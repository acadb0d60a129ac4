use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// String tag that selects the handlers an event is routed to.
///
/// The registry's own types are exposed as constructors, but the set is open:
/// an integrator may declare additional types on the event system.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventType(String);

impl EventType {
    pub const REGISTER_VENDOR: &'static str = "RegisterVendorEvent";
    pub const VENDOR_CLAIM: &'static str = "VendorClaimEvent";
    pub const REGISTER_ENDPOINT: &'static str = "RegisterEndpointEvent";
    pub const VENDOR_CERTIFICATE: &'static str = "VendorCertificateEvent";

    /// Create an event type, rejecting the empty tag.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        if name.is_empty() {
            return Err(TypeError::EmptyEventType);
        }
        Ok(Self(name))
    }

    pub fn register_vendor() -> Self {
        Self(Self::REGISTER_VENDOR.to_string())
    }

    pub fn vendor_claim() -> Self {
        Self(Self::VENDOR_CLAIM.to_string())
    }

    pub fn register_endpoint() -> Self {
        Self(Self::REGISTER_ENDPOINT.to_string())
    }

    pub fn vendor_certificate() -> Self {
        Self(Self::VENDOR_CERTIFICATE.to_string())
    }

    /// All event types the registry itself publishes.
    pub fn registry_types() -> Vec<Self> {
        vec![
            Self::register_vendor(),
            Self::vendor_claim(),
            Self::register_endpoint(),
            Self::vendor_certificate(),
        ]
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for an empty tag (only reachable through deserialization).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for EventType {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for EventType {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for EventType {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}
