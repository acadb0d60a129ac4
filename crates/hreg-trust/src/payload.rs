//! Payloads of the registry's own event types.

use serde::{Deserialize, Serialize};

use hreg_crypto::Certificate;
use hreg_events::{Event, EventError, EventResult};

use crate::error::{TrustError, TrustResult};

/// Payload of a `RegisterVendorEvent`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterVendor {
    /// Vendor identifier, e.g. a URN.
    pub identifier: String,
    pub name: String,
    /// Certificates the vendor signs with. Promoted into the trust store.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub certificates: Vec<Certificate>,
}

/// Payload of a `VendorClaimEvent`: a vendor claims to act for an
/// organization.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorClaim {
    /// Identifier of the claiming vendor.
    pub identifier: String,
    pub organization_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub certificates: Vec<Certificate>,
}

/// Payload of a `RegisterEndpointEvent`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterEndpoint {
    pub identifier: String,
    pub vendor_id: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<Certificate>,
}

impl RegisterVendor {
    pub fn from_event(event: &Event) -> EventResult<Self> {
        event.unmarshal_with(|payload: &mut Self, _| {
            check_vendor(&payload.identifier, &payload.certificates).map_err(payload_error)
        })
    }
}

impl VendorClaim {
    pub fn from_event(event: &Event) -> EventResult<Self> {
        event.unmarshal_with(|payload: &mut Self, _| {
            check_vendor(&payload.identifier, &payload.certificates).map_err(payload_error)
        })
    }
}

impl RegisterEndpoint {
    pub fn from_event(event: &Event) -> EventResult<Self> {
        event.unmarshal_with(|payload: &mut Self, _| {
            check_vendor(&payload.vendor_id, payload.certificate.iter()).map_err(payload_error)
        })
    }
}

/// Every certificate that names a vendor must name `declared`.
pub fn check_vendor<'a>(
    declared: &str,
    certificates: impl IntoIterator<Item = &'a Certificate>,
) -> TrustResult<()> {
    for cert in certificates {
        if let Some(vendor_id) = cert.vendor_id() {
            if vendor_id != declared {
                return Err(TrustError::VendorMismatch {
                    declared: declared.to_string(),
                    subject: cert.subject().to_string(),
                    certificate: vendor_id.to_string(),
                });
            }
        }
    }
    Ok(())
}

fn payload_error(err: TrustError) -> EventError {
    EventError::Payload(err.to_string())
}
