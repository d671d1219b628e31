//! Shipment lookup used to gate evidence operations.

use crate::models::tracking::{
    Address, Dimensions, Package, TrackingEvent, TrackingInfo, TrackingNumber,
};
use std::collections::HashMap;

pub trait TrackingLookup: Send + Sync {
    fn lookup(&self, tracking_number: &TrackingNumber) -> Option<TrackingInfo>;
}

/// Fixed, in-process directory of known shipments.
#[derive(Clone, Debug, Default)]
pub struct StaticTrackingDirectory {
    shipments: HashMap<String, TrackingInfo>,
}

impl StaticTrackingDirectory {
    pub fn new(shipments: impl IntoIterator<Item = TrackingInfo>) -> Self {
        Self {
            shipments: shipments
                .into_iter()
                .map(|info| (info.tracking_number.clone(), info))
                .collect(),
        }
    }

    /// The demo shipments served by default.
    pub fn seeded() -> Self {
        Self::new([
            shipment(
                "1Z999AA1234567890",
                "in_transit",
                ("2025-08-30T15:30:00Z", None),
                ("UPS", "Ground"),
                address("New York", "NY", "10001"),
                address("Los Angeles", "CA", "90210"),
                package(2.5, (12.0, 8.0, 6.0), "Electronics"),
                vec![
                    event(
                        "2025-08-26T10:00:00Z",
                        "picked_up",
                        "New York, NY",
                        "Package picked up",
                        "origin",
                    ),
                    event(
                        "2025-08-27T08:30:00Z",
                        "in_transit",
                        "Philadelphia, PA",
                        "Departed from facility",
                        "sort_facility",
                    ),
                ],
            ),
            shipment(
                "FDX123456789012",
                "delivered",
                ("2025-08-28T14:00:00Z", Some("2025-08-28T13:45:00Z")),
                ("FedEx", "Express"),
                address("Chicago", "IL", "60601"),
                address("Miami", "FL", "33101"),
                package(1.2, (10.0, 6.0, 4.0), "Documents"),
                vec![
                    event(
                        "2025-08-26T09:00:00Z",
                        "picked_up",
                        "Chicago, IL",
                        "Package picked up",
                        "origin",
                    ),
                    event(
                        "2025-08-27T12:00:00Z",
                        "in_transit",
                        "Memphis, TN",
                        "In transit",
                        "sort_facility",
                    ),
                    event(
                        "2025-08-28T08:00:00Z",
                        "out_for_delivery",
                        "Miami, FL",
                        "Out for delivery",
                        "delivery",
                    ),
                    event(
                        "2025-08-28T13:45:00Z",
                        "delivered",
                        "Miami, FL",
                        "Delivered",
                        "delivery",
                    ),
                ],
            ),
            shipment(
                "DHL9876543210",
                "exception",
                ("2025-08-29T16:00:00Z", None),
                ("DHL", "Express"),
                address("San Francisco", "CA", "94102"),
                address("Seattle", "WA", "98101"),
                package(3.8, (15.0, 10.0, 8.0), "Books"),
                vec![
                    event(
                        "2025-08-26T14:00:00Z",
                        "picked_up",
                        "San Francisco, CA",
                        "Package picked up",
                        "origin",
                    ),
                    event(
                        "2025-08-27T18:00:00Z",
                        "exception",
                        "Portland, OR",
                        "Weather delay",
                        "sort_facility",
                    ),
                ],
            ),
        ])
    }
}

impl TrackingLookup for StaticTrackingDirectory {
    fn lookup(&self, tracking_number: &TrackingNumber) -> Option<TrackingInfo> {
        self.shipments.get(tracking_number.as_str()).cloned()
    }
}

#[allow(clippy::too_many_arguments)]
fn shipment(
    tracking_number: &str,
    status: &str,
    (estimated_delivery, actual_delivery): (&str, Option<&str>),
    (carrier, service): (&str, &str),
    origin: Address,
    destination: Address,
    package: Package,
    events: Vec<TrackingEvent>,
) -> TrackingInfo {
    TrackingInfo {
        tracking_number: tracking_number.into(),
        status: status.into(),
        estimated_delivery: estimated_delivery.into(),
        actual_delivery: actual_delivery.map(Into::into),
        carrier: carrier.into(),
        service: service.into(),
        origin,
        destination,
        package,
        events,
    }
}

fn address(city: &str, state: &str, postal_code: &str) -> Address {
    Address {
        city: city.into(),
        state: state.into(),
        country: "USA".into(),
        postal_code: postal_code.into(),
    }
}

fn package(weight: f64, (length, width, height): (f64, f64, f64), description: &str) -> Package {
    Package {
        weight,
        dimensions: Dimensions {
            length,
            width,
            height,
        },
        description: description.into(),
    }
}

fn event(
    timestamp: &str,
    status: &str,
    location: &str,
    description: &str,
    facility_type: &str,
) -> TrackingEvent {
    TrackingEvent {
        timestamp: timestamp.into(),
        status: status.into(),
        location: location.into(),
        description: description.into(),
        facility_type: facility_type.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_directory_knows_demo_shipments() {
        let dir = StaticTrackingDirectory::seeded();
        let ups = TrackingNumber::parse("1Z999AA1234567890").unwrap();
        let info = dir.lookup(&ups).unwrap();
        assert_eq!(info.carrier, "UPS");
        assert_eq!(info.events.len(), 2);

        let fedex = TrackingNumber::parse("FDX123456789012").unwrap();
        assert_eq!(
            dir.lookup(&fedex).unwrap().actual_delivery.as_deref(),
            Some("2025-08-28T13:45:00Z")
        );

        let unknown = TrackingNumber::parse("ZZZZZZZZZZ").unwrap();
        assert!(dir.lookup(&unknown).is_none());
    }
}
