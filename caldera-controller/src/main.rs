/**
 * CALDERA CONTROLLER - Point d'entrée du contrôleur central
 *
 * RÔLE : Orchestration de tous les modules : config, transport chat,
 * processeur de messages, programmes par défaut, boucle de stats, API HTTP.
 *
 * ARCHITECTURE : Event-driven via MQTT + API REST + rapports Influx.
 * UTILITÉ : Cerveau central des déploiements Caldera, point d'administration unique.
 */

mod chat;
mod config;
mod event_log;
mod http;
mod processor;
mod program;
mod programs;
mod state;
mod stats;

use crate::config::load_config;
use crate::http::AppState;
use crate::processor::MessageProcessor;
use crate::state::new_state;
use caldera_core::{ErrorReporter, InfluxStatWriter};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok(); // Ok si .env n'existe pas

    let cfg = load_config().await;
    if cfg.deployments.is_empty() {
        eprintln!("[controller] warning: no deployments configured, nothing will be processed");
    }
    println!(
        "[controller] starting for deployments: [{}]",
        cfg.deployments.join(", ")
    );

    // processeur + programme par défaut éventuel
    let mut processor = MessageProcessor::new(&cfg.deployments);
    if let Some(program_spec) = &cfg.default_program {
        let mut parts = program_spec.split(',').map(str::to_string);
        let name = parts.next().unwrap_or_default();
        let ctor_args: Vec<String> = parts.collect();
        println!("[controller] starting default program \"{}\" everywhere", name);
        processor = processor.with_default_program(&name, &ctor_args);
    }
    let processor = new_state(processor);

    // puits d'erreurs best-effort
    let reporter = cfg.error_sink.as_ref().map(|sink| ErrorReporter::new(&sink.url));

    // writer influx partagé entre boucles
    let influx = cfg.influx.as_ref().map(|conf| {
        let token = std::env::var("INFLUX_TOKEN").unwrap_or_default();
        if token.is_empty() {
            eprintln!("[controller] warning: INFLUX_TOKEN not set, writes will be rejected");
        }
        Arc::new(InfluxStatWriter::new(&conf.url, &conf.org, &conf.bucket, &token))
    });

    // transport chat : écoute + publication
    let (mqtt_client, eventloop) = chat::create_mqtt_client(&cfg);
    let (chat_sender, outbound_rx) = chat::new_chat_sender();
    chat::spawn_outbound_publisher(mqtt_client.clone(), cfg.nickname.clone(), outbound_rx);
    chat::spawn_chat_listener(
        mqtt_client,
        eventloop,
        processor.clone(),
        chat_sender.clone(),
        reporter,
        cfg.nickname.clone(),
    );

    // rapports périodiques de l'état des programmes
    stats::spawn_controller_stat_loop(processor.clone(), influx, cfg.stat_interval_secs());

    // API HTTP (proxy chat + inspection)
    let app_state = AppState { processor, chat: chat_sender };
    let app = http::build_router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.http_port.unwrap_or(8080)));
    println!("[controller] listening on http://{addr}");
    let listener = TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
