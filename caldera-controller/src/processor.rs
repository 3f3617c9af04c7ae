/**
 * MESSAGE PROCESSOR - Dispatch des événements chat entrants
 *
 * RÔLE :
 * Router chaque événement soit vers l'intake de commandes de cycle de vie
 * (control::start / control::stop), soit vers le programme actif du
 * déploiement visé.
 *
 * FONCTIONNEMENT :
 * - Registre fixe des déploiements connus, slot Option<Program> par entrée
 * - L'existence d'un Program est LA porte de traitement des messages nœud :
 *   slot vide = message signalé en no-op, jamais traité
 * - Toute erreur est une valeur structurée remontée à l'appelant ;
 *   une commande invalide ne mute jamais le registre
 */

use crate::program::{Program, RunOutcome, RunResult};
use crate::programs;
use caldera_core::{tag, ChatEvent, ChatSender, ControlError};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

/// Marqueur de routage des commandes de cycle de vie
pub const CONTROL_MARKER: &str = "control";

/// Vue sérialisable d'un déploiement pour l'API et la boucle de stats
#[derive(Debug, Serialize)]
pub struct DeploymentStatus {
    pub deployment_id: String,
    pub program: Option<ProgramStatus>,
}

#[derive(Debug, Serialize)]
pub struct ProgramStatus {
    pub name: String,
    pub phase: String,
    pub ctor_args: serde_json::Map<String, serde_json::Value>,
    pub instance_id: String,
    pub uptime_seconds: u64,
}

/// Ligne de rapport périodique d'un programme vivant
pub struct ControllerReport {
    pub deployment_id: String,
    pub function: String,
    pub phase: String,
    pub ctor_args: serde_json::Map<String, serde_json::Value>,
}

pub struct MessageProcessor {
    deployments: HashMap<String, Option<Program>>,
}

impl MessageProcessor {
    /// Registre initialisé depuis la config ; les clés n'évoluent plus
    pub fn new(deployment_ids: &[String]) -> Self {
        let deployments = deployment_ids
            .iter()
            .map(|id| (id.clone(), None))
            .collect();
        Self { deployments }
    }

    /// Démarre le même programme par défaut sur chaque déploiement
    pub fn with_default_program(mut self, program_name: &str, ctor_args: &[String]) -> Self {
        for (deployment_id, slot) in self.deployments.iter_mut() {
            match programs::build(program_name, ctor_args) {
                Some(function) => *slot = Some(Program::new(function)),
                None => {
                    eprintln!(
                        "[processor] unknown default program \"{}\" for {}, slot left empty",
                        program_name, deployment_id
                    );
                }
            }
        }
        self
    }

    pub fn process(&mut self, chat: &dyn ChatSender, event: &ChatEvent) -> RunResult {
        if event.target.len() < 2 {
            return Err(ControlError::InvalidProtocol(format!(
                "unable to parse event target: \"{}\"",
                event.target
            )));
        }
        let target = event.channel_name().to_string();
        if !self.deployments.contains_key(&target) {
            return Err(ControlError::InvalidProtocol(format!(
                "deployment \"{}\" is not registered to this processor",
                target
            )));
        }

        if event.message().last_field_type() == CONTROL_MARKER {
            println!("[processor] intaking command message from {}", event.source);
            self.intake_command(chat, event, &target)
        } else {
            println!("[processor] processing message from {}", event.source);
            self.process_node_message(chat, event, &target)
        }
    }

    /// control::{start|stop}::{Programme},{args...}
    fn intake_command(
        &mut self,
        chat: &dyn ChatSender,
        event: &ChatEvent,
        target: &str,
    ) -> RunResult {
        let message = event.message();
        if message.len() < 2 {
            return Err(ControlError::InvalidProtocol(format!(
                "unable to intake command: \"{}\"",
                event.text
            )));
        }
        if message.type_tag() != tag::CONTROL {
            return Err(ControlError::InvalidProtocol(format!(
                "unable to intake command: \"{}\", only accepting \"{}\"",
                event.text,
                tag::CONTROL
            )));
        }
        if message.len() < 3 {
            return Err(ControlError::InvalidProtocol(format!(
                "unable to intake command, no third piece: \"{}\"",
                event.text
            )));
        }

        let command = message.field(1).unwrap_or_default().to_string();
        let args = message.args();
        let program_name = args.first().cloned().unwrap_or_default();
        let ctor_args = &args[1.min(args.len())..];

        // résolution avant toute mutation : nom inconnu = zéro effet
        let factory_hit = programs::build(&program_name, ctor_args);

        match command.as_str() {
            "start" => {
                let Some(function) = factory_hit else {
                    return Err(ControlError::InvalidProtocol(format!(
                        "unable to find program: \"{}\"",
                        program_name
                    )));
                };
                chat.send(&event.target, &format!("starting program \"{}\"", args.join(",")));
                println!("[processor] attempting to add program \"{}\"", function.name());
                self.deployments.insert(target.to_string(), Some(Program::new(function)));
                Ok(RunOutcome::Handled)
            }
            "stop" => {
                if factory_hit.is_none() {
                    return Err(ControlError::InvalidProtocol(format!(
                        "unable to find program: \"{}\"",
                        program_name
                    )));
                }
                chat.send(&event.target, &format!("stopping program \"{}\"", args.join(",")));
                println!("[processor] stopping program \"{}\"", program_name);
                self.deployments.insert(target.to_string(), None);
                Ok(RunOutcome::Handled)
            }
            other => Err(ControlError::InvalidProtocol(format!(
                "\"{}\" not implemented yet...  arguments: {:?}",
                other, args
            ))),
        }
    }

    fn process_node_message(
        &mut self,
        chat: &dyn ChatSender,
        event: &ChatEvent,
        target: &str,
    ) -> RunResult {
        let slot = self
            .deployments
            .get_mut(target)
            .ok_or_else(|| ControlError::NoActiveProgram(target.to_string()))?;
        let program = slot
            .as_mut()
            .ok_or_else(|| ControlError::NoActiveProgram(target.to_string()))?;

        let program_name = program.name();
        let result = program.run(chat, event.clone());
        println!(
            "[processor] finished running program \"{}\", result: {:?}",
            program_name, result
        );
        result
    }

    pub fn programs_status(&self) -> Vec<DeploymentStatus> {
        let mut status: Vec<DeploymentStatus> = self
            .deployments
            .iter()
            .map(|(deployment_id, slot)| DeploymentStatus {
                deployment_id: deployment_id.clone(),
                program: slot.as_ref().map(|p| ProgramStatus {
                    name: p.name().to_string(),
                    phase: p.phase(),
                    ctor_args: p.ctor_args(),
                    instance_id: p.instance_id().to_string(),
                    uptime_seconds: p.uptime_seconds(),
                }),
            })
            .collect();
        status.sort_by(|a, b| a.deployment_id.cmp(&b.deployment_id));
        status
    }

    /// Rapports dont le throttle est échu, pour la boucle de stats
    pub fn due_reports(&mut self, interval: Duration) -> Vec<ControllerReport> {
        let mut reports = Vec::new();
        for (deployment_id, slot) in self.deployments.iter_mut() {
            if let Some(program) = slot.as_mut() {
                if program.report_due(interval) {
                    reports.push(ControllerReport {
                        deployment_id: deployment_id.clone(),
                        function: program.name().to_string(),
                        phase: program.phase(),
                        ctor_args: program.ctor_args(),
                    });
                }
            }
        }
        reports
    }

    pub fn has_program(&self, deployment_id: &str) -> bool {
        matches!(self.deployments.get(deployment_id), Some(Some(_)))
    }

    pub fn is_registered(&self, deployment_id: &str) -> bool {
        self.deployments.contains_key(deployment_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caldera_devkit::{ChatMessageBuilder, MockChatClient};
    use serde_json::json;

    fn processor() -> MessageProcessor {
        MessageProcessor::new(&["node1".to_string(), "node2".to_string()])
    }

    #[test]
    fn test_control_marker_routes_to_intake() {
        let chat = MockChatClient::new();
        let mut proc = processor();
        let event = ChatMessageBuilder::event(
            "operator",
            "node1",
            &ChatMessageBuilder::control_start("thermostathold", &["69"]),
        );

        proc.process(&chat, &event).unwrap();
        assert!(proc.has_program("node1"));
        assert!(!proc.has_program("node2"));
        chat.assert_sent("#node1", "starting program \"thermostathold,69\"").unwrap();
    }

    #[test]
    fn test_node_message_without_program_is_a_no_op_error() {
        let chat = MockChatClient::new();
        let mut proc = processor();
        let event = ChatMessageBuilder::event(
            "node1",
            "node1",
            &ChatMessageBuilder::stats(json!({"therm_oil": 65, "relay": false})),
        );

        let result = proc.process(&chat, &event);
        assert!(matches!(result, Err(ControlError::NoActiveProgram(_))));
        assert_eq!(chat.send_count(), 0);
    }

    #[test]
    fn test_node_message_reaches_active_program() {
        let chat = MockChatClient::new();
        let mut proc = processor();
        proc.process(
            &chat,
            &ChatMessageBuilder::event(
                "operator",
                "node1",
                &ChatMessageBuilder::control_start("thermostathold", &["69"]),
            ),
        )
        .unwrap();
        chat.clear();

        let event = ChatMessageBuilder::event(
            "node1",
            "node1",
            &ChatMessageBuilder::stats(json!({"therm_oil": 65, "relay": false})),
        );
        proc.process(&chat, &event).unwrap();
        chat.assert_sent("#node1", "cmd::chng::relay,on").unwrap();
    }

    #[test]
    fn test_unknown_program_name_leaves_registry_untouched() {
        let chat = MockChatClient::new();
        let mut proc = processor();
        let event = ChatMessageBuilder::event(
            "operator",
            "node1",
            &ChatMessageBuilder::control_start("nosuchprogram", &[]),
        );

        let result = proc.process(&chat, &event);
        assert!(matches!(result, Err(ControlError::InvalidProtocol(_))));
        assert!(!proc.has_program("node1"));
        assert_eq!(chat.send_count(), 0);
    }

    #[test]
    fn test_stop_clears_the_deployment_slot() {
        let chat = MockChatClient::new();
        let mut proc = processor();
        proc.process(
            &chat,
            &ChatMessageBuilder::event(
                "operator",
                "node1",
                &ChatMessageBuilder::control_start("presenceheat", &[]),
            ),
        )
        .unwrap();
        assert!(proc.has_program("node1"));

        proc.process(
            &chat,
            &ChatMessageBuilder::event(
                "operator",
                "node1",
                &ChatMessageBuilder::control_stop("presenceheat"),
            ),
        )
        .unwrap();
        assert!(!proc.has_program("node1"));
    }

    #[test]
    fn test_unregistered_deployment_is_rejected() {
        let chat = MockChatClient::new();
        let mut proc = processor();
        let event = ChatMessageBuilder::event("node9", "node9", "stpul");

        let result = proc.process(&chat, &event);
        assert!(matches!(result, Err(ControlError::InvalidProtocol(_))));
    }

    #[test]
    fn test_unknown_lifecycle_command_is_rejected() {
        let chat = MockChatClient::new();
        let mut proc = processor();
        let event =
            ChatMessageBuilder::event("operator", "node1", "control::pause::presenceheat");

        let result = proc.process(&chat, &event);
        assert!(matches!(result, Err(ControlError::InvalidProtocol(_))));
        assert!(!proc.has_program("node1"));
    }

    #[test]
    fn test_intake_requires_three_fields() {
        let chat = MockChatClient::new();
        let mut proc = processor();
        let event = ChatMessageBuilder::event("operator", "node1", "control::start");

        let result = proc.process(&chat, &event);
        assert!(matches!(result, Err(ControlError::InvalidProtocol(_))));
    }

    #[test]
    fn test_default_program_fills_every_slot() {
        let proc = MessageProcessor::new(&["node1".to_string(), "node2".to_string()])
            .with_default_program("thermostathold", &["73".to_string()]);
        assert!(proc.has_program("node1"));
        assert!(proc.has_program("node2"));
        let status = proc.programs_status();
        assert_eq!(status[0].program.as_ref().unwrap().name, "ThermostatHold");
    }

    #[test]
    fn test_due_reports_only_for_live_programs() {
        let mut proc = MessageProcessor::new(&["node1".to_string(), "node2".to_string()]);
        assert!(proc.due_reports(Duration::from_secs(2)).is_empty());

        let mut proc = proc.with_default_program("presenceheat", &[]);
        let reports = proc.due_reports(Duration::from_secs(2));
        assert_eq!(reports.len(), 2);
        // throttle : rien de nouveau tant que l'intervalle n'est pas écoulé
        assert!(proc.due_reports(Duration::from_secs(2)).is_empty());
    }
}
