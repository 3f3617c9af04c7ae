use crate::error::ControlError;
use serde::Serialize;

/// Ligne envoyée au puits d'erreurs externe
#[derive(Debug, Serialize)]
struct ErrorRow<'a> {
    deployment_id: &'a str,
    message: String,
    severity: u8,
    code: u16,
}

/// Remontée best-effort des erreurs persistantes vers un endpoint HTTP.
/// Un échec de remontée est loggé, jamais retenté : le puits d'erreurs ne
/// doit pas pouvoir ralentir la boucle d'événements.
#[derive(Clone)]
pub struct ErrorReporter {
    client: reqwest::Client,
    url: String,
}

impl ErrorReporter {
    pub fn new(url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
        }
    }

    pub async fn report(&self, deployment_id: &str, error: &ControlError) {
        let row = ErrorRow {
            deployment_id,
            message: error.to_string(),
            severity: 10,
            code: error.code(),
        };
        match self.client.post(&self.url).json(&row).send().await {
            Ok(resp) if !resp.status().is_success() => {
                eprintln!("[report] error sink rejected row: HTTP {}", resp.status());
            }
            Ok(_) => {}
            Err(e) => eprintln!("[report] unable to reach error sink: {}", e),
        }
    }
}
