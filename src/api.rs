//! HTTP API.
//!
//! Ingest, query, and minimal administrative endpoints, plus the
//! WebSocket upgrade. Validation errors reject synchronously with a
//! machine-readable reason and no side effects.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::dispatcher::{LocationReport, UpdateDispatcher};
use crate::errors::TrackerError;
use crate::models::{NewVehicle, ServerEvent, VehicleId, VehicleRecord, VehicleStatus};
use crate::realtime::{websocket_handler, Hub};
use crate::store::LocationStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LocationStore>,
    pub hub: Arc<Hub>,
    pub dispatcher: Arc<UpdateDispatcher>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(store: Arc<dyn LocationStore>, hub: Arc<Hub>) -> Self {
        let dispatcher = Arc::new(UpdateDispatcher::new(store.clone(), hub.clone()));
        Self {
            store,
            hub,
            dispatcher,
            started_at: Instant::now(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/update-location", post(update_location))
        .route("/api/bus-location/{identifier}", get(bus_location))
        .route("/api/route-details/{identifier}", get(route_details))
        .route("/api/all-buses", get(all_buses))
        .route("/api/admin/add-bus", post(add_bus))
        .route("/api/admin/remove-bus/{identifier}", delete(remove_bus))
        .route("/ws", get(websocket_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "OK",
        "timestamp": Utc::now(),
        "store": state.store.backend(),
        "uptime": state.started_at.elapsed().as_secs(),
        "activeConnections": state.hub.connection_count(),
    }))
}

async fn update_location(
    State(state): State<AppState>,
    Json(report): Json<LocationReport>,
) -> Result<Json<serde_json::Value>, TrackerError> {
    state.dispatcher.submit_location(report).await?;
    Ok(Json(json!({ "success": true, "message": "Location updated" })))
}

/// Current position snapshot for one vehicle
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LocationSnapshot {
    vehicle_id: VehicleId,
    latitude: f64,
    longitude: f64,
    accuracy: f64,
    captured_at: DateTime<Utc>,
    status: VehicleStatus,
}

impl LocationSnapshot {
    /// An offline or never-reporting vehicle yields no snapshot: viewers
    /// get "not found or offline" rather than stale coordinates.
    fn from_record(record: &VehicleRecord) -> Option<Self> {
        let position = record.position.as_ref()?;
        if record.status != VehicleStatus::Online {
            return None;
        }
        Some(Self {
            vehicle_id: record.vehicle_id.clone(),
            latitude: position.latitude,
            longitude: position.longitude,
            accuracy: position.accuracy,
            captured_at: position.captured_at,
            status: record.status,
        })
    }
}

async fn bus_location(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
) -> Result<Json<LocationSnapshot>, TrackerError> {
    let vehicle_id = VehicleId::try_from(identifier.as_str())?;
    let record = state.store.find(&vehicle_id).await?;
    record
        .as_ref()
        .and_then(LocationSnapshot::from_record)
        .map(Json)
        .ok_or(TrackerError::NotFound {
            vehicle_id: vehicle_id.to_string(),
        })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RouteResponse {
    reg_no: VehicleId,
    bus_number: String,
    route: String,
    start: String,
    destination: String,
    stops: Vec<String>,
}

async fn route_details(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
) -> Result<Json<RouteResponse>, TrackerError> {
    let vehicle_id = VehicleId::try_from(identifier.as_str())?;
    let record =
        state
            .store
            .find(&vehicle_id)
            .await?
            .ok_or_else(|| TrackerError::NotFound {
                vehicle_id: vehicle_id.to_string(),
            })?;
    Ok(Json(RouteResponse {
        reg_no: record.vehicle_id,
        bus_number: record.bus_number,
        route: record.route.route,
        start: record.route.start,
        destination: record.route.destination,
        stops: record.route.stops,
    }))
}

async fn all_buses(
    State(state): State<AppState>,
) -> Result<Json<Vec<LocationSnapshot>>, TrackerError> {
    let online = state.store.list_online().await?;
    Ok(Json(
        online
            .iter()
            .filter_map(LocationSnapshot::from_record)
            .collect(),
    ))
}

async fn add_bus(
    State(state): State<AppState>,
    Json(new): Json<NewVehicle>,
) -> Result<Json<serde_json::Value>, TrackerError> {
    let record = state.store.register(new).await?;
    info!(vehicle = %record.vehicle_id, "bus registered");
    state.hub.push_to_all(ServerEvent::BusAdded {
        vehicle_id: record.vehicle_id.clone(),
    });
    Ok(Json(json!({
        "success": true,
        "regNo": record.vehicle_id,
        "busNumber": record.bus_number,
    })))
}

async fn remove_bus(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
) -> Result<Json<serde_json::Value>, TrackerError> {
    let vehicle_id = VehicleId::try_from(identifier.as_str())?;
    let removed =
        state
            .store
            .remove(&vehicle_id)
            .await?
            .ok_or_else(|| TrackerError::NotFound {
                vehicle_id: vehicle_id.to_string(),
            })?;

    // Deregistration drops any live subscriptions for the vehicle.
    state.hub.registry().drop_vehicle(&removed.vehicle_id);
    state.hub.push_to_all(ServerEvent::BusRemoved {
        vehicle_id: removed.vehicle_id.clone(),
    });
    info!(vehicle = %removed.vehicle_id, "bus removed");
    Ok(Json(json!({ "success": true })))
}
