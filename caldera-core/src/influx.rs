/**
 * INFLUX STAT WRITER - Écriture de métriques InfluxDB v2
 *
 * RÔLE : Pousser les snapshots de stats (nœuds) et l'état des programmes
 * (contrôleur) vers InfluxDB en protocole ligne, taggés par déploiement.
 *
 * FONCTIONNEMENT : POST /api/v2/write, fire-and-forget par intervalle.
 * Un échec d'écriture est loggé par l'appelant, jamais retenté ici.
 */

use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum InfluxError {
    #[error("influx HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("influx rejected write: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
}

pub struct InfluxStatWriter {
    client: reqwest::Client,
    write_url: String,
    token: String,
}

impl InfluxStatWriter {
    /// `url` est la base du serveur, ex: "https://influx.local:8086"
    pub fn new(url: &str, org: &str, bucket: &str, token: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            write_url: format!(
                "{}/api/v2/write?org={}&bucket={}&precision=s",
                url.trim_end_matches('/'),
                org,
                bucket
            ),
            token: token.to_string(),
        }
    }

    /// Écrit une ligne `measurement,deployment=<id> k1=v1,k2=v2`.
    /// Les champs non représentables (null, tableaux) sont sérialisés en
    /// chaîne JSON pour ne jamais perdre une clé silencieusement.
    pub async fn write_fields(
        &self,
        measurement: &str,
        deployment_id: &str,
        fields: &serde_json::Map<String, Value>,
    ) -> Result<(), InfluxError> {
        if fields.is_empty() {
            return Ok(());
        }
        let line = build_line(measurement, deployment_id, fields);
        let resp = self
            .client
            .post(&self.write_url)
            .header("Authorization", format!("Token {}", self.token))
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(line)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(InfluxError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

fn build_line(measurement: &str, deployment_id: &str, fields: &serde_json::Map<String, Value>) -> String {
    let rendered: Vec<String> = fields
        .iter()
        .map(|(key, value)| format!("{}={}", escape_key(key), render_field(value)))
        .collect();
    format!(
        "{},deployment={} {}",
        escape_key(measurement),
        escape_key(deployment_id),
        rendered.join(",")
    )
}

// échappement minimal du protocole ligne : virgules, espaces, égal
fn escape_key(raw: &str) -> String {
    raw.replace(',', "\\,").replace(' ', "\\ ").replace('=', "\\=")
}

fn render_field(value: &Value) -> String {
    match value {
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::String(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
        other => format!("\"{}\"", other.to_string().replace('\\', "\\\\").replace('"', "\\\"")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_line_renders_field_types() {
        let mut fields = serde_json::Map::new();
        fields.insert("therm_oil".into(), json!(65.2));
        fields.insert("relay".into(), json!(false));
        fields.insert("phase".into(), json!("rest"));
        let line = build_line("main_stats", "jumba", &fields);
        // serde_json::Map itère en ordre de clés
        assert_eq!(line, "main_stats,deployment=jumba phase=\"rest\",relay=false,therm_oil=65.2");
    }

    #[test]
    fn test_escape_key_handles_spaces() {
        assert_eq!(escape_key("my stat"), "my\\ stat");
    }
}
