//! Subscription registry.
//!
//! Process-local record of which viewer connections watch which vehicles.
//! Both index directions live behind one lock so every operation appears
//! atomic to readers. Nothing here is persisted; the registry rebuilds
//! from zero on restart.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use uuid::Uuid;

use crate::models::VehicleId;

/// Identifier for one realtime connection
pub type ConnectionId = Uuid;

#[derive(Default)]
pub struct SubscriptionRegistry {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    by_vehicle: HashMap<VehicleId, HashSet<ConnectionId>>,
    by_connection: HashMap<ConnectionId, HashSet<VehicleId>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest; idempotent. No existence check against the
    /// store: subscribing to an unknown vehicle simply never delivers.
    pub fn subscribe(&self, connection_id: ConnectionId, vehicle_id: VehicleId) {
        let mut inner = self.inner.write();
        inner
            .by_vehicle
            .entry(vehicle_id.clone())
            .or_default()
            .insert(connection_id);
        inner
            .by_connection
            .entry(connection_id)
            .or_default()
            .insert(vehicle_id);
    }

    /// Withdraw interest; no-op if not subscribed.
    pub fn unsubscribe(&self, connection_id: ConnectionId, vehicle_id: &VehicleId) {
        let mut inner = self.inner.write();
        if let Some(connections) = inner.by_vehicle.get_mut(vehicle_id) {
            connections.remove(&connection_id);
            if connections.is_empty() {
                inner.by_vehicle.remove(vehicle_id);
            }
        }
        if let Some(vehicles) = inner.by_connection.get_mut(&connection_id) {
            vehicles.remove(vehicle_id);
            if vehicles.is_empty() {
                inner.by_connection.remove(&connection_id);
            }
        }
    }

    /// Drop every subscription held by a closing connection.
    pub fn on_connection_closed(&self, connection_id: ConnectionId) {
        let mut inner = self.inner.write();
        if let Some(vehicles) = inner.by_connection.remove(&connection_id) {
            for vehicle_id in vehicles {
                if let Some(connections) = inner.by_vehicle.get_mut(&vehicle_id) {
                    connections.remove(&connection_id);
                    if connections.is_empty() {
                        inner.by_vehicle.remove(&vehicle_id);
                    }
                }
            }
        }
    }

    /// Drop every subscription for a deregistered vehicle.
    pub fn drop_vehicle(&self, vehicle_id: &VehicleId) {
        let mut inner = self.inner.write();
        if let Some(connections) = inner.by_vehicle.remove(vehicle_id) {
            for connection_id in connections {
                if let Some(vehicles) = inner.by_connection.get_mut(&connection_id) {
                    vehicles.remove(vehicle_id);
                    if vehicles.is_empty() {
                        inner.by_connection.remove(&connection_id);
                    }
                }
            }
        }
    }

    /// Snapshot of the connections watching a vehicle.
    pub fn subscribers_of(&self, vehicle_id: &VehicleId) -> Vec<ConnectionId> {
        let inner = self.inner.read();
        inner
            .by_vehicle
            .get(vehicle_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }
}
