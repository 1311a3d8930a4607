//! In-memory fallback store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::errors::TrackerError;
use crate::models::{NewVehicle, Position, VehicleId, VehicleRecord, VehicleStatus};

use super::LocationStore;

/// Process-local store used when no database is configured or reachable.
///
/// State is lost on restart; that is acceptable for the fallback mode,
/// which trades consistency for availability.
#[derive(Default)]
pub struct MemoryLocationStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    records: HashMap<VehicleId, VehicleRecord>,
    // bus number -> registration number, kept in step with `records`
    by_bus_number: HashMap<String, VehicleId>,
}

impl MemoryLocationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Inner {
    fn resolve<'a>(&'a self, id: &'a VehicleId) -> Option<&'a VehicleId> {
        if self.records.contains_key(id) {
            Some(id)
        } else {
            self.by_bus_number.get(id.as_str())
        }
    }
}

#[async_trait]
impl LocationStore for MemoryLocationStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn register(&self, new: NewVehicle) -> Result<VehicleRecord, TrackerError> {
        let vehicle_id = VehicleId::try_from(new.reg_no.as_str())?;
        let bus_number = new.bus_number.trim().to_uppercase();

        let mut inner = self.inner.write().await;
        if inner.records.contains_key(&vehicle_id) {
            return Err(TrackerError::InvalidInput {
                message: format!("vehicle {vehicle_id} already registered"),
            });
        }
        let record = VehicleRecord::registered(
            vehicle_id.clone(),
            bus_number.clone(),
            new.organization,
            new.route,
        );
        if !bus_number.is_empty() {
            inner.by_bus_number.insert(bus_number, vehicle_id.clone());
        }
        inner.records.insert(vehicle_id, record.clone());
        Ok(record)
    }

    async fn remove(&self, id: &VehicleId) -> Result<Option<VehicleRecord>, TrackerError> {
        let mut inner = self.inner.write().await;
        let Some(key) = inner.resolve(id).cloned() else {
            return Ok(None);
        };
        let removed = inner.records.remove(&key);
        if let Some(record) = &removed {
            inner.by_bus_number.remove(&record.bus_number);
        }
        Ok(removed)
    }

    async fn find(&self, id: &VehicleId) -> Result<Option<VehicleRecord>, TrackerError> {
        let inner = self.inner.read().await;
        Ok(inner
            .resolve(id)
            .and_then(|key| inner.records.get(key))
            .cloned())
    }

    async fn apply_location(
        &self,
        id: &VehicleId,
        position: Position,
        seen_at: DateTime<Utc>,
    ) -> Result<VehicleRecord, TrackerError> {
        let mut inner = self.inner.write().await;
        let key = inner.resolve(id).cloned().unwrap_or_else(|| id.clone());
        let record = inner.records.entry(key.clone()).or_insert_with(|| {
            // No canonical registry here, so an unknown vehicle is
            // accepted and a record springs into existence.
            VehicleRecord::registered(key, String::new(), None, Default::default())
        });
        record.position = Some(position);
        record.status = VehicleStatus::Online;
        record.last_seen = Some(seen_at);
        Ok(record.clone())
    }

    async fn list_online(&self) -> Result<Vec<VehicleRecord>, TrackerError> {
        let inner = self.inner.read().await;
        Ok(inner
            .records
            .values()
            .filter(|r| r.status == VehicleStatus::Online)
            .cloned()
            .collect())
    }

    async fn mark_offline_if_unseen_since(
        &self,
        id: &VehicleId,
        observed_last_seen: DateTime<Utc>,
    ) -> Result<bool, TrackerError> {
        let mut inner = self.inner.write().await;
        let Some(key) = inner.resolve(id).cloned() else {
            return Ok(false);
        };
        let Some(record) = inner.records.get_mut(&key) else {
            return Ok(false);
        };
        if record.status == VehicleStatus::Online && record.last_seen == Some(observed_last_seen) {
            record.status = VehicleStatus::Offline;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_vehicle(reg_no: &str, bus_number: &str) -> NewVehicle {
        NewVehicle {
            reg_no: reg_no.to_string(),
            bus_number: bus_number.to_string(),
            organization: Some("college-a".to_string()),
            route: Default::default(),
        }
    }

    fn position() -> Position {
        Position::new(11.05, 78.1, 20.0, Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn register_then_find_by_either_identifier() {
        let store = MemoryLocationStore::new();
        store
            .register(new_vehicle("tn01ab1234", "a4"))
            .await
            .unwrap();

        let by_reg = store
            .find(&VehicleId::try_from("TN01AB1234").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_reg.status, VehicleStatus::Offline);
        assert_eq!(by_reg.bus_number, "A4");

        let by_number = store
            .find(&VehicleId::try_from("a4").unwrap())
            .await
            .unwrap();
        assert!(by_number.is_some());
    }

    #[tokio::test]
    async fn duplicate_registration_rejected() {
        let store = MemoryLocationStore::new();
        store.register(new_vehicle("A4", "A4")).await.unwrap();
        assert!(store.register(new_vehicle("a4", "B1")).await.is_err());
    }

    #[tokio::test]
    async fn apply_location_upserts_unknown_vehicle() {
        let store = MemoryLocationStore::new();
        let id = VehicleId::try_from("A4").unwrap();
        let now = Utc::now();

        let record = store.apply_location(&id, position(), now).await.unwrap();
        assert_eq!(record.status, VehicleStatus::Online);
        assert_eq!(record.last_seen, Some(now));
        assert_eq!(record.position.unwrap().latitude, 11.05);
    }

    #[tokio::test]
    async fn stale_cas_demotes_only_with_matching_last_seen() {
        let store = MemoryLocationStore::new();
        let id = VehicleId::try_from("A4").unwrap();
        let seen = Utc::now();
        store.apply_location(&id, position(), seen).await.unwrap();

        // A fresh update between the sweep's read and write makes the CAS lose.
        let stale_observation = seen - Duration::seconds(20);
        assert!(!store
            .mark_offline_if_unseen_since(&id, stale_observation)
            .await
            .unwrap());
        assert_eq!(
            store.find(&id).await.unwrap().unwrap().status,
            VehicleStatus::Online
        );

        assert!(store.mark_offline_if_unseen_since(&id, seen).await.unwrap());
        assert_eq!(
            store.find(&id).await.unwrap().unwrap().status,
            VehicleStatus::Offline
        );

        // Second attempt is a no-op: the vehicle is already offline.
        assert!(!store.mark_offline_if_unseen_since(&id, seen).await.unwrap());
    }

    #[tokio::test]
    async fn list_online_excludes_offline_vehicles() {
        let store = MemoryLocationStore::new();
        let a4 = VehicleId::try_from("A4").unwrap();
        let b1 = VehicleId::try_from("B1").unwrap();
        let seen = Utc::now();
        store.apply_location(&a4, position(), seen).await.unwrap();
        store.apply_location(&b1, position(), seen).await.unwrap();
        store.mark_offline_if_unseen_since(&b1, seen).await.unwrap();

        let online = store.list_online().await.unwrap();
        assert_eq!(online.len(), 1);
        assert_eq!(online[0].vehicle_id, a4);
    }

    #[tokio::test]
    async fn remove_drops_both_indexes() {
        let store = MemoryLocationStore::new();
        store.register(new_vehicle("TN01AB1234", "A4")).await.unwrap();

        let removed = store
            .remove(&VehicleId::try_from("a4").unwrap())
            .await
            .unwrap();
        assert!(removed.is_some());
        assert!(store
            .find(&VehicleId::try_from("TN01AB1234").unwrap())
            .await
            .unwrap()
            .is_none());
        assert!(store
            .find(&VehicleId::try_from("A4").unwrap())
            .await
            .unwrap()
            .is_none());
    }
}
