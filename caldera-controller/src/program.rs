/**
 * PROGRAM - Hôte de machine à phases d'un déploiement
 *
 * RÔLE :
 * Un Program lie exactement une fonction de stratégie à un déploiement,
 * possède son historique d'événements, son historique de retours et sa
 * carte de contexte libre (au minimum la clé 'phase').
 *
 * FONCTIONNEMENT :
 * - run(event) enregistre l'événement puis invoque la fonction active
 *   avec un contexte explicite (message, historique, envoi chat, phases)
 * - le retour est archivé (borné, FIFO) puis remonté à l'appelant
 * - call() remplace la fonction active ; une fonction peut demander
 *   elle-même la passation via le contexte
 *
 * UTILITÉ DANS CALDERA :
 * 🎯 Isolation : la panne d'un programme reste une valeur d'erreur,
 *    jamais une faute qui tue le processeur ou touche un autre déploiement
 * 🎯 Persistance de phase : la carte de contexte survit aux passations
 *    de fonction, seul état pilotant les branchements
 */

use crate::event_log::EventLog;
use caldera_core::{ChatEvent, ChatSender, ControlError, Message};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use uuid::Uuid;

/// Capacité de l'historique des valeurs de retour
pub const RETURN_HISTORY_CAPACITY: usize = 600;

/// Phase par défaut au premier passage d'une fonction
pub const PHASE_REST: &str = "rest";

/// Issue d'un run : la fonction a agi (transition/commande) ou laissé courir
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Handled,
    Idle,
}

pub type RunResult = Result<RunOutcome, ControlError>;

/// Contexte explicite fourni à une fonction pour un run.
///
/// Remplace l'accès implicite par back-référence : tout ce qu'une fonction
/// a le droit de voir ou de muter passe par ici, ce qui rend les stratégies
/// testables avec des fakes.
pub struct ProgramCtx<'a> {
    pub message: &'a Message,
    pub event: &'a ChatEvent,
    pub history: &'a EventLog,
    pub returns: &'a VecDeque<RunResult>,
    pub chat: &'a dyn ChatSender,
    pub vars: &'a mut HashMap<String, Value>,
    next_function: &'a mut Option<Box<dyn ProgramFunction>>,
}

impl<'a> ProgramCtx<'a> {
    /// Recherche dans la fenêtre de lookback de l'historique
    pub fn find(&self, type_tag: &str, sender: Option<&str>) -> Option<&'a ChatEvent> {
        self.history.find(type_tag, sender)
    }

    /// Vrai au tout premier run de la fonction (historique de retours vide)
    pub fn first_run(&self) -> bool {
        self.returns.is_empty()
    }

    pub fn phase(&self) -> String {
        self.vars
            .get("phase")
            .and_then(Value::as_str)
            .unwrap_or(PHASE_REST)
            .to_string()
    }

    pub fn set_phase(&mut self, phase: &str) {
        self.vars.insert("phase".to_string(), Value::String(phase.to_string()));
    }

    /// Canal d'origine de l'événement, cible des commandes sortantes
    pub fn reply_target(&self) -> &str {
        &self.event.target
    }

    /// Demande la passation vers une autre stratégie ; appliquée par le
    /// Program à la fin du run courant.
    pub fn hand_off(&mut self, function: Box<dyn ProgramFunction>) {
        *self.next_function = Some(function);
    }
}

/// Logique de décision enfichable, exécutée une fois par événement entrant.
/// Sans état persistant propre : ce qui doit survivre à une passation vit
/// dans la carte de contexte du Program.
pub trait ProgramFunction: Send {
    fn name(&self) -> &'static str;

    /// Arguments de construction, visibles dans les stats contrôleur
    fn ctor_args(&self) -> serde_json::Map<String, Value> {
        serde_json::Map::new()
    }

    fn run(&mut self, ctx: &mut ProgramCtx<'_>) -> RunResult;
}

pub struct Program {
    active_function: Box<dyn ProgramFunction>,
    event_log: EventLog,
    return_history: VecDeque<RunResult>,
    vars: HashMap<String, Value>,
    instance_id: String,
    started_at: OffsetDateTime,
    last_report: Option<Instant>,
}

impl Program {
    pub fn new(function: Box<dyn ProgramFunction>) -> Self {
        println!("[program] calling first function {}", function.name());
        Self {
            active_function: function,
            event_log: EventLog::new(),
            return_history: VecDeque::new(),
            vars: HashMap::new(),
            instance_id: Uuid::new_v4().to_string(),
            started_at: OffsetDateTime::now_utc(),
            last_report: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.active_function.name()
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn uptime_seconds(&self) -> u64 {
        (OffsetDateTime::now_utc() - self.started_at)
            .whole_seconds()
            .max(0) as u64
    }

    pub fn ctor_args(&self) -> serde_json::Map<String, Value> {
        self.active_function.ctor_args()
    }

    pub fn phase(&self) -> String {
        self.vars
            .get("phase")
            .and_then(Value::as_str)
            .unwrap_or(PHASE_REST)
            .to_string()
    }

    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    pub fn return_history(&self) -> &VecDeque<RunResult> {
        &self.return_history
    }

    /// Remplace la fonction active ; la carte de contexte reste en place
    pub fn call(&mut self, function: Box<dyn ProgramFunction>) {
        println!("[program] calling next function {}", function.name());
        self.active_function = function;
    }

    /// Un run par événement entrant ; jamais deux fonctions en concurrence
    /// sur le même Program (récepteur &mut + une tâche par déploiement).
    pub fn run(&mut self, chat: &dyn ChatSender, event: ChatEvent) -> RunResult {
        self.event_log.append(event.clone());
        let message = event.message();
        let mut next_function: Option<Box<dyn ProgramFunction>> = None;

        let result = {
            let mut ctx = ProgramCtx {
                message: &message,
                event: &event,
                history: &self.event_log,
                returns: &self.return_history,
                chat,
                vars: &mut self.vars,
                next_function: &mut next_function,
            };
            self.active_function.run(&mut ctx)
        };

        self.return_history.push_back(result.clone());
        while self.return_history.len() > RETURN_HISTORY_CAPACITY {
            self.return_history.pop_front();
        }

        if let Some(function) = next_function {
            self.call(function);
        }

        result
    }

    /// Throttle des rapports d'état vers Influx ; vrai au premier appel
    /// puis à chaque fois que l'intervalle est écoulé.
    pub fn report_due(&mut self, interval: Duration) -> bool {
        let now = Instant::now();
        match self.last_report {
            Some(last) if now.duration_since(last) < interval => false,
            _ => {
                self.last_report = Some(now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caldera_devkit::{ChatMessageBuilder, MockChatClient};

    struct EchoFunction;

    impl ProgramFunction for EchoFunction {
        fn name(&self) -> &'static str {
            "EchoFunction"
        }

        fn run(&mut self, ctx: &mut ProgramCtx<'_>) -> RunResult {
            if ctx.first_run() {
                ctx.set_phase(PHASE_REST);
            }
            ctx.chat.send(ctx.reply_target(), ctx.message.type_tag());
            Ok(RunOutcome::Handled)
        }
    }

    struct FailingFunction;

    impl ProgramFunction for FailingFunction {
        fn name(&self) -> &'static str {
            "FailingFunction"
        }

        fn run(&mut self, _ctx: &mut ProgramCtx<'_>) -> RunResult {
            Err(ControlError::MissingData("always".into()))
        }
    }

    struct HandOffFunction;

    impl ProgramFunction for HandOffFunction {
        fn name(&self) -> &'static str {
            "HandOffFunction"
        }

        fn run(&mut self, ctx: &mut ProgramCtx<'_>) -> RunResult {
            ctx.hand_off(Box::new(EchoFunction));
            Ok(RunOutcome::Handled)
        }
    }

    #[test]
    fn test_run_records_event_and_return() {
        let chat = MockChatClient::new();
        let mut program = Program::new(Box::new(EchoFunction));
        let event = ChatMessageBuilder::event("node1", "node1", "stpul");

        let result = program.run(&chat, event);
        assert_eq!(result.unwrap(), RunOutcome::Handled);
        assert_eq!(program.event_log().len(), 1);
        assert_eq!(program.return_history().len(), 1);
        assert_eq!(chat.sent_to("#node1"), vec!["stpul".to_string()]);
    }

    #[test]
    fn test_phase_initialized_on_first_run_only() {
        let chat = MockChatClient::new();
        let mut program = Program::new(Box::new(EchoFunction));
        assert_eq!(program.phase(), PHASE_REST);

        program
            .run(&chat, ChatMessageBuilder::event("node1", "node1", "stpul"))
            .unwrap();
        assert_eq!(program.phase(), PHASE_REST);
    }

    #[test]
    fn test_function_error_is_a_value_not_a_fault() {
        let chat = MockChatClient::new();
        let mut program = Program::new(Box::new(FailingFunction));
        let result = program.run(&chat, ChatMessageBuilder::event("node1", "node1", "stpul"));
        assert!(matches!(result, Err(ControlError::MissingData(_))));
        // le retour en erreur est archivé comme les autres
        assert_eq!(program.return_history().len(), 1);
    }

    #[test]
    fn test_return_history_is_bounded_fifo() {
        let chat = MockChatClient::new();
        let mut program = Program::new(Box::new(EchoFunction));
        for _ in 0..(RETURN_HISTORY_CAPACITY + 10) {
            program
                .run(&chat, ChatMessageBuilder::event("node1", "node1", "stpul"))
                .unwrap();
        }
        assert_eq!(program.return_history().len(), RETURN_HISTORY_CAPACITY);
    }

    #[test]
    fn test_hand_off_swaps_active_function() {
        let chat = MockChatClient::new();
        let mut program = Program::new(Box::new(HandOffFunction));
        assert_eq!(program.name(), "HandOffFunction");

        program
            .run(&chat, ChatMessageBuilder::event("node1", "node1", "stpul"))
            .unwrap();
        assert_eq!(program.name(), "EchoFunction");
        // la carte de contexte survit à la passation
        program
            .run(&chat, ChatMessageBuilder::event("node1", "node1", "stpul"))
            .unwrap();
        assert_eq!(program.phase(), PHASE_REST);
    }

    #[test]
    fn test_report_due_throttles() {
        let mut program = Program::new(Box::new(EchoFunction));
        assert!(program.report_due(Duration::from_secs(60)));
        assert!(!program.report_due(Duration::from_secs(60)));
        assert!(program.report_due(Duration::from_millis(0)));
    }
}
