//! Realtime transport.
//!
//! Long-lived WebSocket connections with per-connection bounded outbound
//! queues. Delivery is best-effort: a slow or disconnected viewer drops
//! events rather than queuing without bound.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::api::AppState;
use crate::models::{ClientEvent, ServerEvent, VehicleId};
use crate::registry::{ConnectionId, SubscriptionRegistry};

/// Outbound queue depth per connection; events past this are dropped.
const OUTBOUND_BUFFER: usize = 64;

/// Connection hub: owns the registry and the per-connection senders.
#[derive(Default)]
pub struct Hub {
    connections: DashMap<ConnectionId, mpsc::Sender<ServerEvent>>,
    registry: SubscriptionRegistry,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Attach a new connection, returning its identifier and the receiving
    /// half of its outbound queue.
    pub fn attach(&self) -> (ConnectionId, mpsc::Receiver<ServerEvent>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
        self.connections.insert(id, tx);
        debug!(connection = %id, "client connected");
        (id, rx)
    }

    /// Detach a connection and release its subscriptions. Called exactly
    /// once per connection lifecycle, from the socket task's cleanup path.
    pub fn detach(&self, id: ConnectionId) {
        self.connections.remove(&id);
        self.registry.on_connection_closed(id);
        debug!(connection = %id, "client disconnected");
    }

    /// Deliver an event to every subscriber of a vehicle.
    pub fn push_to_subscribers(&self, vehicle_id: &VehicleId, event: ServerEvent) {
        for connection_id in self.registry.subscribers_of(vehicle_id) {
            self.push_to(connection_id, event.clone());
        }
    }

    /// Deliver an event to every connected client.
    pub fn push_to_all(&self, event: ServerEvent) {
        for entry in self.connections.iter() {
            self.try_deliver(*entry.key(), entry.value(), event.clone());
        }
    }

    fn push_to(&self, connection_id: ConnectionId, event: ServerEvent) {
        if let Some(tx) = self.connections.get(&connection_id) {
            self.try_deliver(connection_id, tx.value(), event);
        }
    }

    fn try_deliver(
        &self,
        connection_id: ConnectionId,
        tx: &mpsc::Sender<ServerEvent>,
        event: ServerEvent,
    ) {
        if let Err(e) = tx.try_send(event) {
            // Full queue or closed socket: the viewer misses this event.
            debug!(connection = %connection_id, "dropping event: {e}");
        }
    }
}

/// Handle WebSocket upgrade request
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.hub))
}

/// Handle an individual WebSocket connection
async fn handle_socket(socket: WebSocket, hub: Arc<Hub>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (connection_id, mut rx) = hub.attach();

    // Outgoing half: forward queued events onto the socket.
    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&event) else {
                continue;
            };
            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Incoming half: track / stop-tracking requests.
    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientEvent>(text.as_str()) {
                Ok(ClientEvent::TrackBus { vehicle_id }) => {
                    debug!(connection = %connection_id, vehicle = %vehicle_id, "tracking");
                    hub.registry().subscribe(connection_id, vehicle_id);
                }
                Ok(ClientEvent::StopTracking { vehicle_id }) => {
                    debug!(connection = %connection_id, vehicle = %vehicle_id, "stopped tracking");
                    hub.registry().unsubscribe(connection_id, &vehicle_id);
                }
                Err(e) => {
                    warn!(connection = %connection_id, "unparseable client event: {e}");
                }
            },
            Ok(Message::Close(_)) => break,
            Err(e) => {
                debug!(connection = %connection_id, "websocket error: {e}");
                break;
            }
            _ => {}
        }
    }

    hub.detach(connection_id);
    writer.abort();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VehicleStatus;

    fn vehicle(id: &str) -> VehicleId {
        VehicleId::try_from(id).unwrap()
    }

    #[tokio::test]
    async fn push_to_subscribers_reaches_only_interested_connections() {
        let hub = Hub::new();
        let (watcher, mut watcher_rx) = hub.attach();
        let (_bystander, mut bystander_rx) = hub.attach();
        hub.registry().subscribe(watcher, vehicle("A4"));

        hub.push_to_subscribers(
            &vehicle("A4"),
            ServerEvent::BusAdded {
                vehicle_id: vehicle("A4"),
            },
        );

        assert!(watcher_rx.recv().await.is_some());
        assert!(bystander_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn push_to_all_reaches_every_connection() {
        let hub = Hub::new();
        let (_a, mut rx_a) = hub.attach();
        let (_b, mut rx_b) = hub.attach();

        hub.push_to_all(ServerEvent::BusStatusChange {
            vehicle_id: vehicle("A4"),
            status: VehicleStatus::Offline,
        });

        assert!(rx_a.recv().await.is_some());
        assert!(rx_b.recv().await.is_some());
    }

    #[tokio::test]
    async fn detached_connection_receives_nothing() {
        let hub = Hub::new();
        let (watcher, mut rx) = hub.attach();
        hub.registry().subscribe(watcher, vehicle("A4"));

        hub.detach(watcher);
        assert!(hub.registry().subscribers_of(&vehicle("A4")).is_empty());

        hub.push_to_all(ServerEvent::BusRemoved {
            vehicle_id: vehicle("A4"),
        });
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let hub = Hub::new();
        let (watcher, _rx) = hub.attach();
        hub.registry().subscribe(watcher, vehicle("A4"));

        // Nothing drains _rx; deliveries past the buffer are discarded.
        for _ in 0..(OUTBOUND_BUFFER + 10) {
            hub.push_to_subscribers(
                &vehicle("A4"),
                ServerEvent::BusAdded {
                    vehicle_id: vehicle("A4"),
                },
            );
        }
        assert_eq!(hub.connection_count(), 1);
    }
}
