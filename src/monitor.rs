//! Staleness monitor.
//!
//! Fixed-interval sweep that demotes vehicles to offline once no update
//! has arrived within the liveness window. Each demotion is an independent
//! compare-and-swap, so a sweep that fails midway leaves already-processed
//! vehicles offline and the rest for the next sweep.

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::config::MonitorConfig;
use crate::errors::TrackerError;
use crate::models::{ServerEvent, VehicleStatus};
use crate::realtime::Hub;
use crate::store::LocationStore;

pub struct StalenessMonitor {
    store: Arc<dyn LocationStore>,
    hub: Arc<Hub>,
    config: MonitorConfig,
}

impl StalenessMonitor {
    pub fn new(store: Arc<dyn LocationStore>, hub: Arc<Hub>, config: MonitorConfig) -> Self {
        Self { store, hub, config }
    }

    /// Run the sweep schedule until the task is aborted. Sweep failures
    /// are logged; the next tick retries independently.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.sweep_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                match self.sweep().await {
                    Ok(0) => {}
                    Ok(demoted) => debug!(demoted, "staleness sweep demoted vehicles"),
                    Err(e) => error!("staleness sweep failed: {e}"),
                }
            }
        })
    }

    /// One pass over all online vehicles. Returns how many were demoted.
    pub async fn sweep(&self) -> Result<usize, TrackerError> {
        let now = Utc::now();
        let mut demoted = 0;

        for record in self.store.list_online().await? {
            let Some(last_seen) = record.last_seen else {
                continue;
            };
            let elapsed = now - last_seen;
            if elapsed.to_std().unwrap_or_default() <= self.config.liveness_threshold {
                continue;
            }

            match self
                .store
                .mark_offline_if_unseen_since(&record.vehicle_id, last_seen)
                .await
            {
                Ok(true) => {
                    debug!(
                        vehicle = %record.vehicle_id,
                        elapsed_secs = elapsed.num_seconds(),
                        "vehicle marked offline"
                    );
                    // Fleet-wide status signal, not scoped to subscribers.
                    self.hub.push_to_all(ServerEvent::BusStatusChange {
                        vehicle_id: record.vehicle_id.clone(),
                        status: VehicleStatus::Offline,
                    });
                    demoted += 1;
                }
                // Lost the compare-and-swap: a fresh update arrived.
                Ok(false) => {}
                Err(e) => {
                    error!(vehicle = %record.vehicle_id, "offline transition failed: {e}");
                }
            }
        }

        Ok(demoted)
    }
}
