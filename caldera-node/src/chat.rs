//! Outbound chat publishing for a node

use caldera_core::{topic_for_channel, ChatEnvelope};
use rumqttc::{AsyncClient, QoS};
use tracing::error;

/// Publish one chat message on a channel topic, wrapped in the transport
/// envelope. Failures are logged; the caller never retries.
pub async fn publish_chat(client: &AsyncClient, source: &str, channel: &str, text: &str) {
    let envelope = ChatEnvelope {
        source: source.to_string(),
        text: text.to_string(),
    };
    let payload = match serde_json::to_string(&envelope) {
        Ok(payload) => payload,
        Err(e) => {
            error!("unable to encode chat envelope: {}", e);
            return;
        }
    };
    if let Err(e) = client
        .publish(topic_for_channel(channel), QoS::AtLeastOnce, false, payload)
        .await
    {
        error!("chat publish failed on {}: {:?}", channel, e);
    }
}
