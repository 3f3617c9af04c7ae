/**
 * CHAT ADAPTER - Transport chat du contrôleur via MQTT
 *
 * RÔLE :
 * Faire le pont entre les canaux chat du protocole (cibles "#node") et les
 * topics MQTT caldera/chan/<canal>. Les payloads sont une enveloppe JSON
 * {source, text} pour transporter l'identité de l'émetteur.
 *
 * FONCTIONNEMENT :
 * - une tâche d'écoute déroule l'event loop MQTT et pousse chaque publish
 *   entrant, séquentiellement, dans le MessageProcessor
 * - les envois sortants passent par une file mpsc drainée par une tâche
 *   de publication ; le cœur reste synchrone et testable avec un mock
 * - erreur de poll : pause 2s puis on continue, la reconnexion est
 *   l'affaire du transport
 */

use crate::config::{ControllerConfig, MqttConf};
use crate::processor::MessageProcessor;
use crate::state::Shared;
use caldera_core::{
    topic_for_channel, ChatEnvelope, ChatEvent, ChatSender, ErrorReporter, CHANNEL_TOPIC_PREFIX,
};
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, QoS};
use tokio::sync::mpsc;
use tokio::task;

#[derive(Debug)]
pub struct OutboundSend {
    pub channel: String,
    pub text: String,
    /// Identité d'émetteur ; None = nick du contrôleur
    pub source: Option<String>,
}

/// Poignée d'envoi clonable ; send() ne bloque jamais le cœur
#[derive(Clone)]
pub struct MqttChatSender {
    tx: mpsc::UnboundedSender<OutboundSend>,
}

impl MqttChatSender {
    fn enqueue(&self, target: &str, text: &str, source: Option<String>) {
        let channel = target.strip_prefix('#').unwrap_or(target).to_string();
        if self
            .tx
            .send(OutboundSend { channel, text: text.to_string(), source })
            .is_err()
        {
            eprintln!("[chat] outbound queue closed, dropping: {}", text);
        }
    }

    /// Envoi sous une autre identité : le proxy HTTP publie sous la sienne
    /// pour que la boucle d'écoute ne saute pas ses messages comme un écho.
    pub fn send_as(&self, source: &str, target: &str, text: &str) {
        self.enqueue(target, text, Some(source.to_string()));
    }
}

impl ChatSender for MqttChatSender {
    fn send(&self, target: &str, text: &str) {
        self.enqueue(target, text, None);
    }
}

pub fn create_mqtt_client(cfg: &ControllerConfig) -> (AsyncClient, EventLoop) {
    let mqtt_cfg = cfg
        .mqtt
        .clone()
        .unwrap_or(MqttConf { host: "localhost".into(), port: 1883 });
    let mut opts = MqttOptions::new(
        format!("caldera-{}", cfg.nickname),
        &mqtt_cfg.host,
        mqtt_cfg.port,
    );
    opts.set_keep_alive(std::time::Duration::from_secs(15));
    AsyncClient::new(opts, 10)
}

pub fn new_chat_sender() -> (MqttChatSender, mpsc::UnboundedReceiver<OutboundSend>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (MqttChatSender { tx }, rx)
}

/// Draine la file sortante vers les topics de canaux
pub fn spawn_outbound_publisher(
    client: AsyncClient,
    nickname: String,
    mut outbound: mpsc::UnboundedReceiver<OutboundSend>,
) {
    task::spawn(async move {
        while let Some(send) = outbound.recv().await {
            let envelope = ChatEnvelope {
                source: send.source.unwrap_or_else(|| nickname.clone()),
                text: send.text,
            };
            let payload = match serde_json::to_string(&envelope) {
                Ok(p) => p,
                Err(e) => {
                    eprintln!("[chat] unable to encode outbound envelope: {}", e);
                    continue;
                }
            };
            let topic = topic_for_channel(&send.channel);
            if let Err(e) = client.publish(topic, QoS::AtLeastOnce, false, payload).await {
                eprintln!("[chat] publish failed: {:?}", e);
            }
        }
    });
}

/// Boucle d'écoute : un seul flux logique d'événements entrants, traités
/// séquentiellement — aucun verrouillage interne nécessaire dans les
/// programmes sous cette discipline.
pub fn spawn_chat_listener(
    client: AsyncClient,
    mut eventloop: EventLoop,
    processor: Shared<MessageProcessor>,
    chat: MqttChatSender,
    reporter: Option<ErrorReporter>,
    nickname: String,
) {
    task::spawn(async move {
        if let Err(e) = client
            .subscribe(format!("{}+", CHANNEL_TOPIC_PREFIX), QoS::AtLeastOnce)
            .await
        {
            eprintln!("[chat] subscribe MQTT failed: {e:?}");
            return;
        }

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(publish))) => {
                    let Some(channel) = publish.topic.strip_prefix(CHANNEL_TOPIC_PREFIX) else {
                        continue;
                    };
                    let envelope: ChatEnvelope = match serde_json::from_slice(&publish.payload) {
                        Ok(env) => env,
                        Err(_) => {
                            eprintln!(
                                "[chat] enveloppe JSON invalide sur {}: {:?}",
                                publish.topic, publish.payload
                            );
                            continue;
                        }
                    };
                    // ne pas retraiter nos propres publications
                    if envelope.source == nickname {
                        continue;
                    }

                    let event =
                        ChatEvent::new(&envelope.source, &format!("#{}", channel), &envelope.text);
                    let deployment = event.channel_name().to_string();
                    // le canal #main n'est qu'un firehose global, et les
                    // canaux inconnus ne nous concernent pas
                    if !processor.lock().is_registered(&deployment) {
                        println!("[chat] message in #{} ignored (not a registered deployment)", deployment);
                        continue;
                    }
                    let result = processor.lock().process(&chat, &event);

                    if let Err(error) = result {
                        eprintln!("[chat] processor error for {}: {}", deployment, error);
                        if let Some(reporter) = &reporter {
                            reporter.report(&deployment, &error).await;
                        }
                    } else {
                        println!("[chat] successfully processed message for {}", deployment);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    eprintln!("[chat] MQTT erreur: {:?}", e);
                    tokio::time::sleep(std::time::Duration::from_secs(2)).await;
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_strips_channel_marker() {
        let (chat, mut rx) = new_chat_sender();
        chat.send("#node1", "cmd::chng::relay,on");
        let out = rx.try_recv().unwrap();
        assert_eq!(out.channel, "node1");
        assert_eq!(out.text, "cmd::chng::relay,on");
        assert!(out.source.is_none());
    }

    #[test]
    fn test_send_as_carries_the_proxy_identity() {
        let (chat, mut rx) = new_chat_sender();
        chat.send_as("http-proxy", "#node1", "control::stop::presenceheat");
        let out = rx.try_recv().unwrap();
        assert_eq!(out.source.as_deref(), Some("http-proxy"));
    }

    #[test]
    fn test_sender_accepts_bare_channel_names() {
        let (chat, mut rx) = new_chat_sender();
        chat.send("node2", "stpul");
        assert_eq!(rx.try_recv().unwrap().channel, "node2");
    }
}
