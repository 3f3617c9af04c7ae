/*!
Mock du transport chat pour développement sans broker

Permet de tester le processeur et les programmes sans démarrer de broker.
Enregistre tous les envois sortants et permet des assertions dessus.
*/

use anyhow::Result;
use caldera_core::ChatSender;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub target: String,
    pub text: String,
}

/// Mock qui simule la surface d'envoi du transport chat
#[derive(Clone, Default)]
pub struct MockChatClient {
    sent: Arc<Mutex<Vec<SentMessage>>>,
}

impl MockChatClient {
    pub fn new() -> Self {
        env_logger::try_init().ok(); // init logging pour tests
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Récupère tous les messages envoyés (pour assertions de tests)
    pub fn sent_messages(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// Messages envoyés vers un canal donné
    pub fn sent_to(&self, target: &str) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.target == target)
            .map(|m| m.text.clone())
            .collect()
    }

    pub fn last_send(&self) -> Option<SentMessage> {
        self.sent.lock().unwrap().last().cloned()
    }

    pub fn send_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    /// Assert qu'un texte précis est parti vers un canal
    pub fn assert_sent(&self, target: &str, text: &str) -> Result<()> {
        let found = self
            .sent
            .lock()
            .unwrap()
            .iter()
            .any(|m| m.target == target && m.text == text);
        if !found {
            anyhow::bail!("expected \"{}\" sent to {}, got: {:?}", text, target, self.sent_messages());
        }
        Ok(())
    }

    /// Reset tous les messages enregistrés
    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

impl ChatSender for MockChatClient {
    fn send(&self, target: &str, text: &str) {
        log::info!("[MOCK] send to {}: {}", target, text);
        self.sent.lock().unwrap().push(SentMessage {
            target: target.to_string(),
            text: text.to_string(),
        });
    }
}
