/*!
Builders de messages protocole formatés comme sur le vrai canal chat.

Chaque builder retourne le texte encodé '::' prêt à entrer dans un
ChatEvent, identique à ce que publient les nœuds et le contrôleur.
*/

use caldera_core::ChatEvent;
use serde_json::Value;

pub struct ChatMessageBuilder;

impl ChatMessageBuilder {
    /// Snapshot de stats d'un nœud, ex: stats::{"therm_oil":65.0,"relay":false}
    pub fn stats(fields: Value) -> String {
        format!("stats::{}", fields)
    }

    /// Snapshot thermique de flotte, imbriqué hôte -> board -> {"board": °C}
    pub fn miner(fleet: Value) -> String {
        format!("miner::{}", fleet)
    }

    /// Snapshot de flotte à un seul hôte et un seul board
    pub fn miner_single(host: &str, board_celsius: f64) -> String {
        Self::miner(serde_json::json!({
            host: { "board_0": { "board": board_celsius, "chip": board_celsius + 10.0 } }
        }))
    }

    /// Commande de cycle de vie: control::start::<programme>,<args...>
    pub fn control_start(program: &str, ctor_args: &[&str]) -> String {
        let mut args = vec![program.to_string()];
        args.extend(ctor_args.iter().map(|a| a.to_string()));
        format!("control::start::{}", args.join(","))
    }

    pub fn control_stop(program: &str) -> String {
        format!("control::stop::{}", program)
    }

    /// Changement d'état device: cmd::chng::<device>,<valeur>
    pub fn change(device: &str, value: &str) -> String {
        format!("cmd::chng::{},{}", device, value)
    }

    /// Événement chat complet prêt pour le processeur
    pub fn event(source: &str, channel: &str, text: &str) -> ChatEvent {
        ChatEvent::new(source, &format!("#{}", channel), text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stats_builder_is_parseable() {
        let text = ChatMessageBuilder::stats(json!({"therm_oil": 65.0, "relay": false}));
        let msg = caldera_core::Message::parse(&text);
        assert_eq!(msg.type_tag(), "stats");
        let payload: Value = serde_json::from_str(&msg.payload().unwrap()).unwrap();
        assert_eq!(payload["therm_oil"], json!(65.0));
    }

    #[test]
    fn test_control_builders() {
        assert_eq!(
            ChatMessageBuilder::control_start("thermostathold", &["73"]),
            "control::start::thermostathold,73"
        );
        assert_eq!(ChatMessageBuilder::control_stop("presenceheat"), "control::stop::presenceheat");
    }

    #[test]
    fn test_event_targets_hash_channel() {
        let ev = ChatMessageBuilder::event("node1", "node1", "stpul");
        assert_eq!(ev.target, "#node1");
        assert_eq!(ev.channel_name(), "node1");
    }
}
