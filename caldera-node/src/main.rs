//! Caldera Node - embedded deployment agent
//!
//! One process per physical deployment:
//! - joins its own chat channel over MQTT and executes controller commands
//!   (device changes, fleet functions, stat pulls)
//! - publishes stats:: and miner:: snapshots on a fixed interval
//! - reports every handling error to its channel (err::) and to the
//!   configured error sink, without ever leaving the message loop

mod chat;
mod config;
mod devices;
mod fleet;
mod handler;
mod registry;
mod stats;

use crate::chat::publish_chat;
use crate::handler::NodeReply;
use crate::registry::DeviceRegistry;
use anyhow::Result;
use caldera_core::{
    topic_for_channel, ChatEnvelope, ControlError, ErrorReporter, InfluxStatWriter, Message,
    CHANNEL_TOPIC_PREFIX,
};
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Channel used as a global firehose log; commands never come from it
const MAIN_CHANNEL: &str = "main";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = config::load_config()?;
    info!(
        "caldera node \"{}\" starting ({} devices declared)",
        config.deployment_id,
        config.devices.len()
    );

    let registry = Arc::new(config::build_registry(&config));
    let reporter = config.error_sink.as_ref().map(|sink| ErrorReporter::new(&sink.url));
    let influx = config.influx.as_ref().map(|conf| {
        let token = std::env::var("INFLUX_TOKEN").unwrap_or_default();
        if token.is_empty() {
            warn!("INFLUX_TOKEN not set, influx writes will be rejected");
        }
        Arc::new(InfluxStatWriter::new(&conf.url, &conf.org, &conf.bucket, &token))
    });

    let mut options = MqttOptions::new(
        format!("caldera-node-{}", config.deployment_id),
        &config.mqtt.host,
        config.mqtt.port,
    );
    options.set_keep_alive(Duration::from_secs(30));
    let (client, mut eventloop) = AsyncClient::new(options, 10);

    client
        .subscribe(topic_for_channel(&config.deployment_id), QoS::AtLeastOnce)
        .await?;
    client
        .subscribe(topic_for_channel(MAIN_CHANNEL), QoS::AtLeastOnce)
        .await?;

    stats::spawn_stat_publisher(
        client.clone(),
        registry.clone(),
        config.deployment_id.clone(),
        influx.clone(),
        config.stat_interval_secs,
    );

    info!("connected to MQTT, listening for commands...");
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Incoming::Publish(publish))) => {
                let Some(channel) = publish.topic.strip_prefix(CHANNEL_TOPIC_PREFIX) else {
                    continue;
                };
                let envelope: ChatEnvelope = match serde_json::from_slice(&publish.payload) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        warn!("invalid chat envelope on {}: {}", publish.topic, e);
                        continue;
                    }
                };
                handle_chat_message(
                    &client,
                    &registry,
                    &config.deployment_id,
                    influx.as_deref(),
                    reporter.as_ref(),
                    channel,
                    envelope,
                )
                .await;
            }
            Ok(_) => {}
            Err(e) => {
                error!("MQTT error: {:?}", e);
                sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

async fn handle_chat_message(
    client: &AsyncClient,
    registry: &Arc<DeviceRegistry>,
    deployment_id: &str,
    influx: Option<&InfluxStatWriter>,
    reporter: Option<&ErrorReporter>,
    channel: &str,
    envelope: ChatEnvelope,
) {
    // our own publications come back on the same topic
    if envelope.source == deployment_id {
        return;
    }
    // the main channel is a global log, never a command source
    if channel == MAIN_CHANNEL {
        info!("message in the #main channel: {}", envelope.text);
        return;
    }
    if channel != deployment_id {
        return;
    }

    debug!("received message from {}: {}", envelope.source, envelope.text);
    let message = Message::parse(&envelope.text);

    // device and fleet dispatch may block on hardware or sockets
    let handler_registry = registry.clone();
    let handled = tokio::task::spawn_blocking(move || {
        handler::handle_message(&handler_registry, &message)
    })
    .await
    .unwrap_or_else(|e| Err(ControlError::Device(format!("handler task failed: {}", e))));

    match handled {
        Ok(NodeReply::Done) => debug!("command executed"),
        Ok(NodeReply::FleetResults(results)) => {
            for result in &results {
                info!(
                    "fleet {}: {} (code {})",
                    result.host,
                    if result.ok { "ok" } else { "failed" },
                    result.code
                );
            }
        }
        Ok(NodeReply::StatPull) => {
            stats::publish_snapshot(client, registry, deployment_id, influx).await;
        }
        Ok(NodeReply::Ignored) => {}
        Err(error) => {
            warn!("unable to handle \"{}\": {}", envelope.text, error);
            publish_chat(client, deployment_id, deployment_id, &handler::error_reply(&error)).await;
            if let Some(reporter) = reporter {
                reporter.report(deployment_id, &error).await;
            }
        }
    }
}
