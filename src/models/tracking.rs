//! Shipment identity and the static tracking data served alongside evidence.

use crate::services::evidence_service::EvidenceError;
use serde::{Deserialize, Serialize};
use std::fmt;

const TRACKING_NUMBER_MIN_LEN: usize = 10;
const TRACKING_NUMBER_MAX_LEN: usize = 20;

/// A tracking number that has passed format validation.
///
/// Only uppercase ASCII letters and digits, 10–20 characters long. Values of
/// this type are safe to use as a single path segment.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TrackingNumber(String);

impl TrackingNumber {
    /// Validate `raw` against `^[A-Z0-9]{10,20}$`.
    pub fn parse(raw: &str) -> Result<Self, EvidenceError> {
        if Self::is_well_formed(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(EvidenceError::InvalidTrackingNumber(raw.to_string()))
        }
    }

    pub fn is_well_formed(raw: &str) -> bool {
        let len = raw.len();
        (TRACKING_NUMBER_MIN_LEN..=TRACKING_NUMBER_MAX_LEN).contains(&len)
            && raw
                .bytes()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackingNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TrackingNumber {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        TrackingNumber::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Shipment status document returned by the tracking endpoint.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TrackingInfo {
    pub tracking_number: String,
    pub status: String,
    pub estimated_delivery: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_delivery: Option<String>,
    pub carrier: String,
    pub service: String,
    pub origin: Address,
    pub destination: Address,
    pub package: Package,
    pub events: Vec<TrackingEvent>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub city: String,
    pub state: String,
    pub country: String,
    pub postal_code: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Package {
    /// Weight in kilograms.
    pub weight: f64,
    pub dimensions: Dimensions,
    pub description: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Dimensions {
    pub length: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TrackingEvent {
    pub timestamp: String,
    pub status: String,
    pub location: String,
    pub description: String,
    pub facility_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_uppercase_alphanumerics_in_range() {
        assert!(TrackingNumber::parse("1Z999AA1234567890").is_ok());
        assert!(TrackingNumber::parse("ABCDEFGHIJ").is_ok());
        assert!(TrackingNumber::parse("A1234567890123456789").is_ok());
    }

    #[test]
    fn rejects_malformed_values() {
        for raw in [
            "BADID",
            "",
            "abcdefghijkl",
            "1Z999AA12345678901234",
            "../../etc/passwd",
            "1Z999AA1234/67890",
            "1Z999AA1234 67890",
        ] {
            let err = TrackingNumber::parse(raw).unwrap_err();
            assert_eq!(err.code(), "invalid_tracking_number", "{raw}");
        }
    }

    #[test]
    fn deserialization_revalidates() {
        let ok: TrackingNumber = serde_json::from_str("\"FDX123456789012\"").unwrap();
        assert_eq!(ok.as_str(), "FDX123456789012");
        assert!(serde_json::from_str::<TrackingNumber>("\"../x\"").is_err());
    }
}
