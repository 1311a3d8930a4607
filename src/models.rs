//! Data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::TrackerError;

/// Vehicle registration identifier
///
/// Canonically uppercase; lookups are case-insensitive because every
/// boundary normalizes through this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VehicleId(String);

impl TryFrom<&str> for VehicleId {
    type Error = TrackerError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(TrackerError::InvalidInput {
                message: "vehicle identifier cannot be empty".to_string(),
            });
        }
        Ok(Self(trimmed.to_uppercase()))
    }
}

impl TryFrom<String> for VehicleId {
    type Error = TrackerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl From<VehicleId> for String {
    fn from(id: VehicleId) -> Self {
        id.0
    }
}

impl std::fmt::Display for VehicleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl VehicleId {
    /// Get the canonical identifier string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A validated GPS fix
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Latitude in WGS84 decimal degrees, within [-90, 90]
    pub latitude: f64,
    /// Longitude in WGS84 decimal degrees, within [-180, 180]
    pub longitude: f64,
    /// Estimated accuracy radius in meters
    pub accuracy: f64,
    /// When the fix was captured on the device
    pub captured_at: DateTime<Utc>,
}

impl Position {
    pub fn new(
        latitude: f64,
        longitude: f64,
        accuracy: f64,
        captured_at: DateTime<Utc>,
    ) -> Result<Self, TrackerError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(TrackerError::InvalidInput {
                message: format!("latitude {latitude} outside [-90, 90]"),
            });
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(TrackerError::InvalidInput {
                message: format!("longitude {longitude} outside [-180, 180]"),
            });
        }
        if !accuracy.is_finite() || accuracy < 0.0 {
            return Err(TrackerError::InvalidInput {
                message: format!("accuracy {accuracy} must be non-negative"),
            });
        }
        Ok(Self {
            latitude,
            longitude,
            accuracy,
            captured_at,
        })
    }
}

/// Vehicle liveness state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleStatus {
    Online,
    Offline,
}

impl VehicleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleStatus::Online => "online",
            VehicleStatus::Offline => "offline",
        }
    }
}

impl TryFrom<&str> for VehicleStatus {
    type Error = TrackerError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "online" => Ok(VehicleStatus::Online),
            "offline" => Ok(VehicleStatus::Offline),
            other => Err(TrackerError::Internal(format!(
                "unknown vehicle status {other:?}"
            ))),
        }
    }
}

/// Static route metadata, owned by the administrative layer and
/// consumed read-only here.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteDetails {
    #[serde(default)]
    pub route: String,
    #[serde(default)]
    pub start: String,
    #[serde(default)]
    pub destination: String,
    #[serde(default)]
    pub stops: Vec<String>,
}

/// Last known state of one tracked vehicle
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleRecord {
    pub vehicle_id: VehicleId,
    /// Short fleet label, e.g. `A4`; empty in fallback-created records
    pub bus_number: String,
    /// Owning tenant; `None` for records created in fallback mode
    pub organization: Option<String>,
    pub route: RouteDetails,
    pub status: VehicleStatus,
    pub position: Option<Position>,
    pub last_seen: Option<DateTime<Utc>>,
}

impl VehicleRecord {
    /// Pre-seeded record for a freshly registered vehicle
    pub fn registered(
        vehicle_id: VehicleId,
        bus_number: String,
        organization: Option<String>,
        route: RouteDetails,
    ) -> Self {
        Self {
            vehicle_id,
            bus_number,
            organization,
            route,
            status: VehicleStatus::Offline,
            position: None,
            last_seen: None,
        }
    }
}

/// Vehicle registration request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewVehicle {
    pub reg_no: String,
    pub bus_number: String,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(flatten)]
    pub route: RouteDetails,
}

/// Messages a viewer sends over the realtime channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    TrackBus { vehicle_id: VehicleId },
    #[serde(rename_all = "camelCase")]
    StopTracking { vehicle_id: VehicleId },
}

/// Messages the server pushes to viewers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    LocationUpdate {
        vehicle_id: VehicleId,
        latitude: f64,
        longitude: f64,
        accuracy: f64,
        captured_at: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    BusStatusChange {
        vehicle_id: VehicleId,
        status: VehicleStatus,
    },
    #[serde(rename_all = "camelCase")]
    BusAdded { vehicle_id: VehicleId },
    #[serde(rename_all = "camelCase")]
    BusRemoved { vehicle_id: VehicleId },
}

impl ServerEvent {
    /// Build a `location-update` event from an accepted position
    pub fn location_update(vehicle_id: VehicleId, position: &Position) -> Self {
        ServerEvent::LocationUpdate {
            vehicle_id,
            latitude: position.latitude,
            longitude: position.longitude,
            accuracy: position.accuracy,
            captured_at: position.captured_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn vehicle_id_normalizes_to_uppercase() {
        let id = VehicleId::try_from(" tn01ab1234 ").unwrap();
        assert_eq!(id.as_str(), "TN01AB1234");
    }

    #[test]
    fn vehicle_id_rejects_empty() {
        assert!(VehicleId::try_from("   ").is_err());
    }

    #[test]
    fn position_rejects_out_of_range_latitude() {
        let err = Position::new(200.0, 78.1, 20.0, Utc::now()).unwrap_err();
        assert!(matches!(err, TrackerError::InvalidInput { .. }));
    }

    #[test]
    fn position_rejects_out_of_range_longitude() {
        assert!(Position::new(11.05, -180.5, 20.0, Utc::now()).is_err());
    }

    #[test]
    fn position_rejects_negative_accuracy() {
        assert!(Position::new(11.05, 78.1, -1.0, Utc::now()).is_err());
    }

    #[test]
    fn position_accepts_boundary_values() {
        assert!(Position::new(90.0, -180.0, 0.0, Utc::now()).is_ok());
    }

    #[test]
    fn parse_track_bus() {
        let s = r#"{"event":"track-bus","vehicleId":"a4"}"#;
        let event: ClientEvent = serde_json::from_str(s).unwrap();
        assert_eq!(
            event,
            ClientEvent::TrackBus {
                vehicle_id: VehicleId::try_from("A4").unwrap()
            }
        );
    }

    #[test]
    fn serialize_location_update() {
        let captured_at = Utc.with_ymd_and_hms(2026, 8, 30, 12, 0, 0).unwrap();
        let position = Position::new(11.05, 78.1, 20.0, captured_at).unwrap();
        let event = ServerEvent::location_update(VehicleId::try_from("A4").unwrap(), &position);

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "location-update");
        assert_eq!(value["vehicleId"], "A4");
        assert_eq!(value["latitude"], 11.05);
        assert_eq!(value["accuracy"], 20.0);
    }

    #[test]
    fn serialize_status_change() {
        let event = ServerEvent::BusStatusChange {
            vehicle_id: VehicleId::try_from("A4").unwrap(),
            status: VehicleStatus::Offline,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "bus-status-change");
        assert_eq!(value["status"], "offline");
    }
}
