use crate::message::Message;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Préfixe des topics MQTT portant les canaux chat
pub const CHANNEL_TOPIC_PREFIX: &str = "caldera/chan/";

pub fn topic_for_channel(channel: &str) -> String {
    format!("{}{}", CHANNEL_TOPIC_PREFIX, channel)
}

/// Enveloppe de transport d'un message chat : MQTT ne porte pas d'identité
/// d'émetteur, on la transporte dans le payload.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatEnvelope {
    pub source: String,
    pub text: String,
}

/// Événement chat reçu : un message plus ses métadonnées de réception.
/// Immutable une fois enregistré dans un historique.
#[derive(Debug, Clone)]
pub struct ChatEvent {
    /// Identité de l'émetteur (nick du nœud ou du contrôleur)
    pub source: String,
    /// Canal visé, avec son '#' de tête (ex: "#jumba")
    pub target: String,
    /// Texte brut du message, encodé au protocole '::'
    pub text: String,
    /// Horodatage de réception côté processus
    pub received_at: OffsetDateTime,
}

impl ChatEvent {
    pub fn new(source: &str, target: &str, text: &str) -> Self {
        Self {
            source: source.to_string(),
            target: target.to_string(),
            text: text.to_string(),
            received_at: OffsetDateTime::now_utc(),
        }
    }

    /// Parse le texte en message protocole (à la demande, le texte fait foi)
    pub fn message(&self) -> Message {
        Message::parse(&self.text)
    }

    /// Nom de canal sans le marqueur '#' de tête
    pub fn channel_name(&self) -> &str {
        self.target.strip_prefix('#').unwrap_or(&self.target)
    }
}

/// Seule surface de sortie vers le transport chat.
///
/// Implémenté par l'adaptateur MQTT du contrôleur et par le mock du devkit ;
/// les programmes et le processeur ne voient jamais le client réel.
pub trait ChatSender: Send + Sync {
    fn send(&self, target: &str, text: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_name_strips_hash() {
        let ev = ChatEvent::new("node1", "#node1", "stpul");
        assert_eq!(ev.channel_name(), "node1");
        let ev = ChatEvent::new("node1", "node1", "stpul");
        assert_eq!(ev.channel_name(), "node1");
    }

    #[test]
    fn test_message_parses_text() {
        let ev = ChatEvent::new("ctrl", "#node1", "cmd::chng::relay,on");
        assert_eq!(ev.message().type_tag(), "cmd");
    }

    #[test]
    fn test_topic_mapping() {
        assert_eq!(topic_for_channel("node1"), "caldera/chan/node1");
    }

    #[test]
    fn test_envelope_round_trip() {
        let envelope = ChatEnvelope { source: "node1".into(), text: "stpul".into() };
        let raw = serde_json::to_string(&envelope).unwrap();
        let back: ChatEnvelope = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.source, "node1");
        assert_eq!(back.text, "stpul");
    }
}
