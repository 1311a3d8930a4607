// src/store.rs
//! Location store abstraction.
//!
//! The store is the single source of truth for vehicle state. One trait,
//! two implementations: [`PgLocationStore`] for durable storage and
//! [`MemoryLocationStore`] as the availability fallback when no database
//! is reachable. The choice is made once at startup; request handlers
//! never branch on connection state.

mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use memory::MemoryLocationStore;
pub use postgres::PgLocationStore;

use crate::errors::TrackerError;
use crate::models::{NewVehicle, Position, VehicleId, VehicleRecord};

#[async_trait]
pub trait LocationStore: Send + Sync {
    /// Short backend label for health reporting
    fn backend(&self) -> &'static str;

    /// Register a vehicle, pre-seeded offline with no position
    async fn register(&self, new: NewVehicle) -> Result<VehicleRecord, TrackerError>;

    /// Deregister a vehicle; returns the removed record if it existed
    async fn remove(&self, id: &VehicleId) -> Result<Option<VehicleRecord>, TrackerError>;

    /// Look up by registration number or bus number
    async fn find(&self, id: &VehicleId) -> Result<Option<VehicleRecord>, TrackerError>;

    /// Apply an accepted location update: position, `last_seen` and
    /// `status = online` change together, atomically from any reader's
    /// point of view. Returns the updated record.
    ///
    /// The durable store rejects unknown vehicles with `NotFound`; the
    /// in-memory fallback creates a record on first update.
    async fn apply_location(
        &self,
        id: &VehicleId,
        position: Position,
        seen_at: DateTime<Utc>,
    ) -> Result<VehicleRecord, TrackerError>;

    /// All vehicles currently marked online
    async fn list_online(&self) -> Result<Vec<VehicleRecord>, TrackerError>;

    /// Demote a vehicle to offline only if its `last_seen` still equals
    /// the value observed by the sweep. Returns whether the transition
    /// happened; a lost compare-and-swap means a fresh update won the race.
    async fn mark_offline_if_unseen_since(
        &self,
        id: &VehicleId,
        observed_last_seen: DateTime<Utc>,
    ) -> Result<bool, TrackerError>;
}
