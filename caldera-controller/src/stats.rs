use crate::processor::MessageProcessor;
use crate::state::Shared;
use caldera_core::InfluxStatWriter;
use std::sync::Arc;
use std::time::Duration;
use tokio::task;

/// Boucle de rapport périodique de l'état des programmes vers Influx.
/// Lecture seule sur l'état des programmes (hors timestamp de throttle) ;
/// n'écrit que vers l'extérieur, aucune course avec le traitement d'événements.
pub fn spawn_controller_stat_loop(
    processor: Shared<MessageProcessor>,
    influx: Option<Arc<InfluxStatWriter>>,
    interval_secs: u64,
) {
    let Some(influx) = influx else {
        eprintln!("[stats] no influx configured, controller state reporting disabled");
        return;
    };

    task::spawn(async move {
        let interval = Duration::from_secs(interval_secs);
        let mut ticker = tokio::time::interval(interval);

        loop {
            ticker.tick().await;

            // verrou court : on extrait les rapports puis on relâche
            let reports = processor.lock().due_reports(interval);

            for report in reports {
                let mut fields = report.ctor_args.clone();
                fields.insert("function".into(), report.function.clone().into());
                fields.insert("phase".into(), report.phase.clone().into());

                println!(
                    "[stats] sending state to influx: {} -> {} ({})",
                    report.deployment_id, report.function, report.phase
                );
                if let Err(e) = influx
                    .write_fields("controller", &report.deployment_id, &fields)
                    .await
                {
                    eprintln!("[stats] failed to write controller state: {}", e);
                }
            }
        }
    });
}
