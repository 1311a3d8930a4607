//! Durable Postgres-backed store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::info;

use crate::errors::TrackerError;
use crate::models::{
    NewVehicle, Position, RouteDetails, VehicleId, VehicleRecord, VehicleStatus,
};

use super::LocationStore;

const RECORD_COLUMNS: &str = "reg_no, bus_number, organization, route, start_point, \
     destination, stops, status, last_seen, latitude, longitude, accuracy, captured_at";

pub struct PgLocationStore {
    pool: PgPool,
}

impl PgLocationStore {
    /// Connect and run migrations
    pub async fn connect(url: &str) -> Result<Self, TrackerError> {
        info!("Connecting to location store");
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await
            .map_err(|e| TrackerError::StoreUnavailable(e.to_string()))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| TrackerError::MigrationError(e.to_string()))?;

        Ok(Self { pool })
    }

    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn record_from_row(row: &sqlx::postgres::PgRow) -> Result<VehicleRecord, TrackerError> {
        let status: String = row.try_get("status")?;
        let latitude: Option<f64> = row.try_get("latitude")?;
        let longitude: Option<f64> = row.try_get("longitude")?;
        let accuracy: Option<f64> = row.try_get("accuracy")?;
        let captured_at: Option<DateTime<Utc>> = row.try_get("captured_at")?;

        let position = match (latitude, longitude, accuracy, captured_at) {
            (Some(latitude), Some(longitude), Some(accuracy), Some(captured_at)) => {
                Some(Position {
                    latitude,
                    longitude,
                    accuracy,
                    captured_at,
                })
            }
            _ => None,
        };

        let reg_no: String = row.try_get("reg_no")?;
        Ok(VehicleRecord {
            vehicle_id: VehicleId::try_from(reg_no.as_str())?,
            bus_number: row.try_get("bus_number")?,
            organization: row.try_get("organization")?,
            route: RouteDetails {
                route: row.try_get("route")?,
                start: row.try_get("start_point")?,
                destination: row.try_get("destination")?,
                stops: row.try_get("stops")?,
            },
            status: VehicleStatus::try_from(status.as_str())?,
            position,
            last_seen: row.try_get("last_seen")?,
        })
    }
}

#[async_trait]
impl LocationStore for PgLocationStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn register(&self, new: NewVehicle) -> Result<VehicleRecord, TrackerError> {
        let vehicle_id = VehicleId::try_from(new.reg_no.as_str())?;
        let bus_number = new.bus_number.trim().to_uppercase();

        let sql = format!(
            "INSERT INTO buses (reg_no, bus_number, organization, route, start_point, \
             destination, stops) VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (reg_no) DO NOTHING RETURNING {RECORD_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(vehicle_id.as_str())
            .bind(&bus_number)
            .bind(&new.organization)
            .bind(&new.route.route)
            .bind(&new.route.start)
            .bind(&new.route.destination)
            .bind(&new.route.stops)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Self::record_from_row(&row),
            None => Err(TrackerError::InvalidInput {
                message: format!("vehicle {vehicle_id} already registered"),
            }),
        }
    }

    async fn remove(&self, id: &VehicleId) -> Result<Option<VehicleRecord>, TrackerError> {
        let sql = format!(
            "DELETE FROM buses WHERE reg_no = $1 OR bus_number = $1 RETURNING {RECORD_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| Self::record_from_row(&row)).transpose()
    }

    async fn find(&self, id: &VehicleId) -> Result<Option<VehicleRecord>, TrackerError> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM buses WHERE reg_no = $1 OR bus_number = $1"
        );
        let row = sqlx::query(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| Self::record_from_row(&row)).transpose()
    }

    async fn apply_location(
        &self,
        id: &VehicleId,
        position: Position,
        seen_at: DateTime<Utc>,
    ) -> Result<VehicleRecord, TrackerError> {
        // Position, last_seen and status move together in one statement,
        // so no reader observes a stale position with a fresh last_seen.
        let sql = format!(
            "UPDATE buses SET latitude = $2, longitude = $3, accuracy = $4, \
             captured_at = $5, last_seen = $6, status = 'online' \
             WHERE reg_no = $1 RETURNING {RECORD_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(id.as_str())
            .bind(position.latitude)
            .bind(position.longitude)
            .bind(position.accuracy)
            .bind(position.captured_at)
            .bind(seen_at)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Self::record_from_row(&row),
            None => Err(TrackerError::NotFound {
                vehicle_id: id.to_string(),
            }),
        }
    }

    async fn list_online(&self) -> Result<Vec<VehicleRecord>, TrackerError> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM buses WHERE status = 'online'");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(Self::record_from_row).collect()
    }

    async fn mark_offline_if_unseen_since(
        &self,
        id: &VehicleId,
        observed_last_seen: DateTime<Utc>,
    ) -> Result<bool, TrackerError> {
        // Compare-and-swap on last_seen: an update landing between the
        // sweep's read and this write keeps the vehicle online.
        let result = sqlx::query(
            "UPDATE buses SET status = 'offline' \
             WHERE reg_no = $1 AND status = 'online' AND last_seen = $2",
        )
        .bind(id.as_str())
        .bind(observed_last_seen)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
