use std::fmt;

// champ séparateur du protocole ; centralisé si on change le protocole plus tard
pub const FIELD_SEPARATOR: &str = "::";

/// Types de messages échangés entre le contrôleur et les nœuds
pub mod tag {
    pub const NODE: &str = "node";
    pub const COMMAND: &str = "cmd";
    pub const CONTROL: &str = "control";
    pub const ERROR: &str = "err";
    pub const STATS: &str = "stats";
    pub const MINER: &str = "miner";
    pub const STATPUSH: &str = "stpsh";
    pub const STATPULL: &str = "stpul";
}

/// Types de commandes que le contrôleur envoie aux nœuds
pub mod command {
    pub const READ: &str = "read";
    // changement d'état d'un device, ex: chng::pump1,on
    pub const CHANGE_STATE: &str = "chng";
    // appel d'une fonction flotte, ex: func::miner::start
    pub const FUNCTION: &str = "func";
}

/// Message texte du protocole : liste ordonnée de champs séparés par "::".
///
/// Le parse ne valide jamais le nombre de champs ; c'est à l'appelant de
/// vérifier `len()` avant d'indexer. L'encodage est l'inverse exact du parse
/// tant qu'aucun champ ne contient lui-même le séparateur (limitation
/// acceptée du protocole, pas d'échappement).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    fields: Vec<String>,
}

impl Message {
    pub fn parse(raw: &str) -> Self {
        Self {
            fields: raw.split(FIELD_SEPARATOR).map(str::to_string).collect(),
        }
    }

    pub fn from_fields(fields: Vec<String>) -> Self {
        Self { fields }
    }

    pub fn encode(&self) -> String {
        self.fields.join(FIELD_SEPARATOR)
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }

    /// Tag de type : premier champ (split garantit au moins un champ)
    pub fn type_tag(&self) -> &str {
        self.fields.first().map(String::as_str).unwrap_or("")
    }

    /// Tag de routage dérivé : champs inversés puis dernier élément.
    ///
    /// C'est le comportement historique sur lequel s'appuient le dispatch et
    /// la recherche d'historique ; à conserver tel quel même si d'autres
    /// chemins matchent sur le premier champ.
    pub fn last_field_type(&self) -> &str {
        self.fields
            .iter()
            .rev()
            .last()
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Arguments d'une commande : troisième champ séparé par des virgules.
    pub fn args(&self) -> Vec<String> {
        match self.field(2) {
            Some(raw) => raw.split(',').map(str::to_string).collect(),
            None => Vec::new(),
        }
    }

    /// Tout ce qui suit le premier séparateur, tel quel.
    /// Utilisé pour extraire un payload JSON qui peut lui-même contenir ':'.
    pub fn payload(&self) -> Option<String> {
        if self.fields.len() < 2 {
            return None;
        }
        Some(self.fields[1..].join(FIELD_SEPARATOR))
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_encode_round_trip() {
        let raw = "cmd::chng::relay,on";
        let msg = Message::parse(raw);
        assert_eq!(msg.encode(), raw);
        assert_eq!(msg.len(), 3);
        assert_eq!(msg.type_tag(), "cmd");
        assert_eq!(msg.field(1), Some("chng"));
    }

    #[test]
    fn test_round_trip_with_json_payload() {
        let raw = r#"stats::{"therm_oil": 65.2, "relay": false}"#;
        let msg = Message::parse(raw);
        assert_eq!(msg.encode(), raw);
        assert_eq!(msg.payload().as_deref(), Some(r#"{"therm_oil": 65.2, "relay": false}"#));
    }

    #[test]
    fn test_routing_tag_matches_leading_field() {
        // le balayage inversé retombe toujours sur le champ de tête
        assert_eq!(Message::parse("control::start::presenceheat").last_field_type(), "control");
        assert_eq!(Message::parse(r#"stats::{"a": 1}"#).last_field_type(), "stats");
        assert_eq!(Message::parse("stpul").last_field_type(), "stpul");
    }

    #[test]
    fn test_args_comma_split() {
        let msg = Message::parse("control::start::thermostathold,73");
        assert_eq!(msg.args(), vec!["thermostathold".to_string(), "73".to_string()]);
        assert!(Message::parse("stpul").args().is_empty());
    }

    #[test]
    fn test_payload_preserves_extra_separators() {
        let msg = Message::parse("stats::a::b");
        assert_eq!(msg.payload().as_deref(), Some("a::b"));
        assert_eq!(Message::parse("stpul").payload(), None);
    }
}
