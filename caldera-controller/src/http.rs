/**
 * API HTTP CALDERA - Proxy HTTP vers le canal chat
 *
 * RÔLE :
 * Interface humaine du contrôleur : inspection des programmes qui tournent
 * et injection de messages chat depuis un frontend ou un script, sans
 * client MQTT.
 *
 * SÉCURITÉ :
 * - Header x-api-key obligatoire sur toutes routes sauf /health
 * - Validation côté middleware avant traitement métier
 */

use crate::chat::MqttChatSender;
use crate::processor::{DeploymentStatus, MessageProcessor};
use crate::state::Shared;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identité sous laquelle le proxy publie sur le canal chat
const PROXY_SOURCE: &str = "http-proxy";

#[derive(Clone)]
pub struct AppState {
    pub processor: Shared<MessageProcessor>,
    pub chat: MqttChatSender,
}

async fn require_api_key(req: Request, next: Next) -> Result<Response, StatusCode> {
    let path = req.uri().path();

    // Health check toujours accessible
    if path.starts_with("/health") {
        return Ok(next.run(req).await);
    }

    let expected = std::env::var("CALDERA_API_KEY").unwrap_or_default();
    if expected.is_empty() {
        eprintln!("SECURITY: CALDERA_API_KEY not set - API access denied");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let ok = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == expected)
        .unwrap_or(false);

    if !ok {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/programs", get(get_programs))
        .route("/send", post(send_message))
        .with_state(app_state)
        .layer(middleware::from_fn(require_api_key))
}

// GET /programs (état des déploiements)
async fn get_programs(State(app): State<AppState>) -> Json<Vec<DeploymentStatus>> {
    Json(app.processor.lock().programs_status())
}

#[derive(Debug, Deserialize)]
struct SendBody {
    target: String,
    text: String,
}

#[derive(Debug, Serialize)]
struct SendAck {
    sent: bool,
    id: String,
}

// POST /send {target, text} -> injection sur le canal chat
async fn send_message(
    State(app): State<AppState>,
    Json(body): Json<SendBody>,
) -> (StatusCode, Json<SendAck>) {
    if body.target.is_empty() || body.text.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(SendAck { sent: false, id: String::new() }),
        );
    }
    app.chat.send_as(PROXY_SOURCE, &body.target, &body.text);
    let id = Uuid::new_v4().to_string();
    println!("[http] proxied message {} to {}", id, body.target);
    (StatusCode::OK, Json(SendAck { sent: true, id }))
}
