/// Erreurs du cœur de contrôle, toutes récupérées à la frontière qui les
/// détecte et remontées comme valeurs — jamais de panique dans la boucle
/// d'événements, une panne d'un déploiement ne doit pas toucher les autres.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ControlError {
    #[error("invalid protocol: {0}")]
    InvalidProtocol(String),
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("device error: {0}")]
    Device(String),
    #[error("miner fleet error: {0}")]
    MinerFleet(String),
    #[error("no active program for deployment \"{0}\"")]
    NoActiveProgram(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("missing data: {0}")]
    MissingData(String),
}

impl ControlError {
    /// Code numérique pour les lignes du puits d'erreurs
    pub fn code(&self) -> u16 {
        match self {
            ControlError::InvalidProtocol(_) => 400,
            ControlError::DeviceNotFound(_) => 404,
            ControlError::Device(_) => 500,
            ControlError::MinerFleet(_) => 502,
            ControlError::NoActiveProgram(_) => 409,
            ControlError::Decode(_) => 422,
            ControlError::MissingData(_) => 424,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(ControlError::DeviceNotFound("x".into()).code(), 404);
        assert_eq!(ControlError::MissingData("hall1".into()).code(), 424);
    }

    #[test]
    fn test_display_names_the_deployment() {
        let e = ControlError::NoActiveProgram("jumba".into());
        assert!(e.to_string().contains("jumba"));
    }
}
