//! Boot reconciliation
//!
//! Brings the broker and workers in line with the store at process
//! start: durable topology for every channel, a directional worker per
//! channel, a route worker per route, a scheduled task per collector.
//!
//! Everything here is idempotent (declarations are, and starts are
//! keyed), and everything is per-item: one bad row logs and the rest
//! of the boot continues.

use tracing::{error, info, warn};

use mezzo_broker::Broker;
use mezzo_store::{Store, DIRECTION_INBOUND, DIRECTION_OUTBOUND};

use crate::scheduler::CollectorScheduler;
use crate::supervisor::Supervisor;

/// Reconcile broker topology and workers with the store.
pub async fn reconcile(
    store: &Store,
    broker: &Broker,
    supervisor: &Supervisor,
    scheduler: &CollectorScheduler,
) {
    info!("reconciling topology and workers with the store");

    match store.channels().list().await {
        Err(e) => error!(error = %e, "failed to list channels for reconciliation"),
        Ok(channels) => {
            for channel in channels {
                info!(
                    channel = %channel.name,
                    destination = %channel.destination,
                    direction = %channel.direction,
                    "reconciling channel"
                );

                if let Err(e) = broker.setup_durable_topology(&channel.destination).await {
                    error!(channel = %channel.name, error = %e, "failed to set up durable topology");
                    continue;
                }

                match channel.direction.as_str() {
                    DIRECTION_INBOUND => supervisor.start_inbound_forwarder(&channel.destination),
                    DIRECTION_OUTBOUND => supervisor.start_outbound_collector(&channel.destination),
                    other => {
                        warn!(channel = %channel.name, direction = other, "unknown direction, no worker started");
                    }
                }
            }
        }
    }

    match store.routes().list().await {
        Err(e) => error!(error = %e, "failed to list routes for reconciliation"),
        Ok(routes) => {
            for route in routes {
                if let Err(e) = supervisor
                    .start_router(&route.id, &route.name, &route.source_channel_id)
                    .await
                {
                    error!(route_id = %route.id, error = %e, "failed to start route worker");
                }
            }
        }
    }

    if let Err(e) = scheduler.start().await {
        error!(error = %e, "failed to register collectors");
    }

    info!(workers = supervisor.worker_count(), "reconciliation complete");
}
