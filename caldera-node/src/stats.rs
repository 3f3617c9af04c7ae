//! Periodic stat collection and publication
//!
//! A fixed-interval task independent of the command loop: it reads device
//! state and writes outward (Influx, chat), never touching program state on
//! the controller side. Device reads may block on hardware, so the gather
//! step runs on the blocking pool.

use crate::chat::publish_chat;
use crate::registry::DeviceRegistry;
use caldera_core::{ControlError, InfluxStatWriter};
use rumqttc::AsyncClient;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task;
use tracing::{debug, error, info};

pub fn spawn_stat_publisher(
    client: AsyncClient,
    registry: Arc<DeviceRegistry>,
    deployment_id: String,
    influx: Option<Arc<InfluxStatWriter>>,
    interval_secs: u64,
) {
    task::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        loop {
            ticker.tick().await;
            publish_snapshot(&client, &registry, &deployment_id, influx.as_deref()).await;
        }
    });
}

/// Collect and publish one stats snapshot (also used to answer stpul)
pub async fn publish_snapshot(
    client: &AsyncClient,
    registry: &Arc<DeviceRegistry>,
    deployment_id: &str,
    influx: Option<&InfluxStatWriter>,
) {
    info!("collecting and sending stats...");
    let gather_registry = registry.clone();
    let gathered = task::spawn_blocking(move || {
        let snapshot = gather_registry.stats_snapshot();
        let fleet = gather_registry.fleet_temperatures();
        (snapshot, fleet)
    })
    .await;

    let (snapshot, fleet): (
        serde_json::Map<String, Value>,
        Option<Result<serde_json::Map<String, Value>, ControlError>>,
    ) = match gathered {
        Ok(parts) => parts,
        Err(e) => {
            error!("stat gather task failed: {}", e);
            return;
        }
    };

    if snapshot.is_empty() {
        debug!("no readable devices, skipping stats publish");
    } else {
        if let Some(influx) = influx {
            if let Err(e) = influx.write_fields("main_stats", deployment_id, &snapshot).await {
                error!("unable to write stats to influx: {}", e);
            } else {
                debug!("stats successfully written to influx");
            }
        }
        let text = format!("stats::{}", Value::Object(snapshot));
        publish_chat(client, deployment_id, deployment_id, &text).await;
    }

    match fleet {
        Some(Ok(temps)) => {
            let text = format!("miner::{}", Value::Object(temps));
            publish_chat(client, deployment_id, deployment_id, &text).await;
        }
        Some(Err(e)) => error!("unable to pull fleet temperatures: {}", e),
        None => {}
    }
}
