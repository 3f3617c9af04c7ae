use caldera_core::ChatEvent;
use std::collections::VecDeque;

/// Capacité par défaut de l'historique d'un programme
pub const DEFAULT_CAPACITY: usize = 600;

/// Fenêtre de recherche : seuls les derniers messages comptent.
/// Un stat plus vieux que ça est considéré périmé et n'est jamais retourné,
/// l'appelant doit tolérer l'absence de donnée.
pub const LOOKBACK: usize = 30;

/// Historique borné d'événements, ordre d'insertion préservé,
/// éviction FIFO du plus ancien. Propriété exclusive d'un Program,
/// jamais partagé entre déploiements.
#[derive(Debug)]
pub struct EventLog {
    events: VecDeque<ChatEvent>,
    capacity: usize,
}

impl EventLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY)),
            capacity,
        }
    }

    pub fn append(&mut self, event: ChatEvent) {
        self.events.push_back(event);
        while self.events.len() > self.capacity {
            self.events.pop_front();
        }
    }

    /// Dernier événement de la fenêtre de lookback dont le tag de routage
    /// correspond à `type_tag`, avec filtre optionnel sur l'émetteur.
    pub fn find(&self, type_tag: &str, sender: Option<&str>) -> Option<&ChatEvent> {
        let window_start = self.events.len().saturating_sub(LOOKBACK);
        self.events
            .iter()
            .skip(window_start)
            .rev()
            .find(|event| {
                event.message().last_field_type() == type_tag
                    && sender.map_or(true, |s| event.source == s)
            })
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChatEvent> {
        self.events.iter()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(source: &str, text: &str) -> ChatEvent {
        ChatEvent::new(source, "#node1", text)
    }

    #[test]
    fn test_fifo_eviction_keeps_newest() {
        let mut log = EventLog::with_capacity(5);
        for i in 0..8 {
            log.append(ev("x", &format!("stats::{{\"n\": {}}}", i)));
        }
        assert_eq!(log.len(), 5);
        // les 3 plus anciens ont été évincés
        let first = log.iter().next().unwrap();
        assert!(first.text.contains("\"n\": 3"));
    }

    #[test]
    fn test_find_returns_most_recent_match() {
        let mut log = EventLog::new();
        log.append(ev("x", r#"stats::{"a": 1}"#));
        log.append(ev("y", r#"miner::{"h": {}}"#));

        // avec seulement A et B insérés, le filtre émetteur retombe sur A
        let found = log.find("stats", Some("x")).unwrap();
        assert!(found.text.contains("\"a\": 1"));

        log.append(ev("x", r#"stats::{"a": 2}"#));
        let found = log.find("stats", None).unwrap();
        assert!(found.text.contains("\"a\": 2"));
    }

    #[test]
    fn test_find_filters_by_sender() {
        let mut log = EventLog::new();
        log.append(ev("x", r#"stats::{"a": 1}"#));
        log.append(ev("y", r#"stats::{"a": 2}"#));
        let found = log.find("stats", Some("x")).unwrap();
        assert!(found.text.contains("\"a\": 1"));
        assert!(log.find("stats", Some("z")).is_none());
    }

    #[test]
    fn test_find_ignores_entries_older_than_lookback() {
        let mut log = EventLog::new();
        log.append(ev("x", r#"stats::{"old": true}"#));
        for _ in 0..LOOKBACK {
            log.append(ev("x", "stpul"));
        }
        // le seul stats est sorti de la fenêtre
        assert!(log.find("stats", None).is_none());
    }

    #[test]
    fn test_find_on_empty_log() {
        let log = EventLog::new();
        assert!(log.find("stats", None).is_none());
    }
}
