//! Update dispatcher.
//!
//! Validates incoming position reports, writes them through the location
//! store, and fans the accepted position out to subscribed viewers. A
//! per-vehicle mutex is held across the write + broadcast pair so updates
//! for one vehicle apply in arrival order and the broadcast never carries
//! a position the store does not hold as current.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::errors::TrackerError;
use crate::models::{Position, ServerEvent, VehicleId, VehicleRecord};
use crate::realtime::Hub;
use crate::store::LocationStore;

/// Incoming position report, as posted by a driver client
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationReport {
    pub vehicle_id: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub accuracy: Option<f64>,
    /// Device-side capture time; server receipt time when absent
    #[serde(default)]
    pub captured_at: Option<DateTime<Utc>>,
}

pub struct UpdateDispatcher {
    store: Arc<dyn LocationStore>,
    hub: Arc<Hub>,
    // One lock per vehicle; cross-vehicle updates stay fully concurrent.
    vehicle_locks: DashMap<VehicleId, Arc<Mutex<()>>>,
}

impl UpdateDispatcher {
    pub fn new(store: Arc<dyn LocationStore>, hub: Arc<Hub>) -> Self {
        Self {
            store,
            hub,
            vehicle_locks: DashMap::new(),
        }
    }

    /// Validate, persist, and broadcast one position report.
    pub async fn submit_location(
        &self,
        report: LocationReport,
    ) -> Result<VehicleRecord, TrackerError> {
        let vehicle_id = VehicleId::try_from(report.vehicle_id.as_str())?;
        let now = Utc::now();
        let position = Position::new(
            report.latitude,
            report.longitude,
            report.accuracy.unwrap_or(0.0),
            report.captured_at.unwrap_or(now),
        )?;

        let lock = self
            .vehicle_locks
            .entry(vehicle_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();
        let _guard = lock.lock().await;

        let record = self
            .store
            .apply_location(&vehicle_id, position, now)
            .await?;

        debug!(
            vehicle = %record.vehicle_id,
            latitude = position.latitude,
            longitude = position.longitude,
            accuracy = position.accuracy,
            "location updated"
        );

        // Broadcast is keyed by the canonical registration number so every
        // viewer of this vehicle sees the same event.
        self.hub.push_to_subscribers(
            &record.vehicle_id,
            ServerEvent::location_update(record.vehicle_id.clone(), &position),
        );

        Ok(record)
    }
}
