use crate::program::{ProgramCtx, ProgramFunction, RunOutcome, RunResult, PHASE_REST};
use crate::programs::{decode_tagged_json, field_bool, field_f64};
use caldera_core::{tag, temp, ChatSender as _, ControlError};
use serde_json::Value;

const PHASE_HEATING: &str = "heating";

/// Contrôle double-seuil d'une boucle hydraulique chauffée par la flotte.
///
/// Deux pompes (huile, eau) plus le démarrage/arrêt des mineurs comme
/// source de chaleur. Exige un snapshot `stats` ET un snapshot `miner`
/// récents : sans température de flotte exploitable, le run échoue sans
/// rien commander.
pub struct HydronicLoop {
    target_temp: f64,
}

impl HydronicLoop {
    pub fn new(target_temp: f64) -> Self {
        Self { target_temp }
    }

    pub fn build(ctor_args: &[String]) -> Box<dyn ProgramFunction> {
        let target_temp = match ctor_args.first() {
            Some(raw) => raw.parse::<f64>().unwrap_or_else(|_| {
                eprintln!("[programs] non float parsable target used to instantiate HydronicLoop, setting to 0");
                0.0
            }),
            None => 104.0,
        };
        Box::new(Self::new(target_temp))
    }
}

/// Maximum des températures par board du snapshot de flotte, en Fahrenheit.
/// None dès qu'une entrée board est inexploitable ou qu'aucune n'existe.
fn fleet_max_temp(fleet: &Value) -> Option<f64> {
    let hosts = fleet.as_object()?;
    let mut max: Option<f64> = None;
    for boards in hosts.values() {
        for (slot, entry) in boards.as_object()?.iter() {
            if !slot.contains("board") {
                continue;
            }
            let celsius = entry.get("board").and_then(Value::as_f64)?;
            let fahrenheit = temp::celsius_to_fahrenheit(celsius);
            max = Some(match max {
                Some(current) => current.max(fahrenheit),
                None => fahrenheit,
            });
        }
    }
    max
}

impl ProgramFunction for HydronicLoop {
    fn name(&self) -> &'static str {
        "HydronicLoop"
    }

    fn ctor_args(&self) -> serde_json::Map<String, Value> {
        let mut args = serde_json::Map::new();
        args.insert("target_temp".into(), self.target_temp.into());
        args
    }

    fn run(&mut self, ctx: &mut ProgramCtx<'_>) -> RunResult {
        let stats_text = ctx.find(tag::STATS, None).map(|e| e.text.clone());
        let stats = decode_tagged_json(stats_text.as_deref(), tag::STATS)?;
        let miner_text = ctx.find(tag::MINER, None).map(|e| e.text.clone());
        let miner = decode_tagged_json(miner_text.as_deref(), tag::MINER)?;

        if ctx.first_run() {
            ctx.set_phase(PHASE_REST);
            println!("[programs] setting program phase to \"{}\"", PHASE_REST);
        }

        let pump_oil = field_bool(&stats, "pump_oil");
        let pump_water = field_bool(&stats, "pump_water");
        let therm_oil = field_f64(&stats, "therm_oil");
        let therm_water = field_f64(&stats, "therm_water");
        let miner_max_temp = fleet_max_temp(&miner);

        let (Some(pump_oil), Some(pump_water), Some(_therm_oil), Some(therm_water), Some(_miner_max)) =
            (pump_oil, pump_water, therm_oil, therm_water, miner_max_temp)
        else {
            return Err(ControlError::MissingData(format!(
                "unable to get needed stats: {:?}",
                ["pump_oil", "pump_water", "therm_oil", "therm_water", "miner_max_temp"]
            )));
        };

        let target = ctx.reply_target().to_string();

        if ctx.phase() == PHASE_REST {
            if therm_water < self.target_temp {
                if !pump_oil {
                    ctx.chat.send(&target, "cmd::chng::pump_oil,on");
                }
                if !pump_water {
                    ctx.chat.send(&target, "cmd::chng::pump_water,on");
                }
                if !pump_oil && !pump_water {
                    ctx.chat.send(&target, "cmd::func::miner::start");
                }
                ctx.set_phase(PHASE_HEATING);
                return Ok(RunOutcome::Handled);
            }
            if therm_water > self.target_temp {
                if pump_oil {
                    ctx.chat.send(&target, "cmd::chng::pump_oil,off");
                }
                if pump_water {
                    ctx.chat.send(&target, "cmd::chng::pump_water,off");
                }
                return Ok(RunOutcome::Handled);
            }
        }

        if ctx.phase() == PHASE_HEATING {
            if therm_water < self.target_temp + 1.0 {
                if !pump_oil {
                    ctx.chat.send(&target, "cmd::chng::pump_oil,on");
                }
                if !pump_water {
                    ctx.chat.send(&target, "cmd::chng::pump_water,on");
                }
                if !pump_oil && !pump_water {
                    ctx.chat.send(&target, "cmd::func::miner::start");
                }
                return Ok(RunOutcome::Handled);
            }
            if therm_water > self.target_temp {
                if pump_oil {
                    ctx.chat.send(&target, "cmd::chng::pump_oil,off");
                }
                if pump_water {
                    ctx.chat.send(&target, "cmd::chng::pump_water,off");
                }
                ctx.chat.send(&target, "cmd::func::miner::stop");
                ctx.set_phase(PHASE_REST);
                return Ok(RunOutcome::Handled);
            }
        }

        Ok(RunOutcome::Idle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::Program;
    use caldera_devkit::{ChatMessageBuilder, MockChatClient};
    use serde_json::json;

    fn cold_stats() -> Value {
        json!({"pump_oil": false, "pump_water": false, "therm_oil": 90.0, "therm_water": 95.0})
    }

    fn seed_miner(program: &mut Program, chat: &MockChatClient, celsius: f64) {
        let event = ChatMessageBuilder::event(
            "node1",
            "node1",
            &ChatMessageBuilder::miner_single("asic0", celsius),
        );
        let _ = program.run(chat, event);
    }

    #[test]
    fn test_cold_water_at_rest_starts_pumps_and_fleet() {
        let chat = MockChatClient::new();
        let mut program = Program::new(HydronicLoop::build(&["104".to_string()]));
        seed_miner(&mut program, &chat, 61.0);
        chat.clear();

        let event = ChatMessageBuilder::event(
            "node1",
            "node1",
            &ChatMessageBuilder::stats(cold_stats()),
        );
        program.run(&chat, event).unwrap();

        assert_eq!(
            chat.sent_to("#node1"),
            vec![
                "cmd::chng::pump_oil,on".to_string(),
                "cmd::chng::pump_water,on".to_string(),
                "cmd::func::miner::start".to_string(),
            ]
        );
        assert_eq!(program.phase(), "heating");
    }

    #[test]
    fn test_hot_water_while_heating_stops_everything() {
        let chat = MockChatClient::new();
        let mut program = Program::new(HydronicLoop::build(&["104".to_string()]));
        seed_miner(&mut program, &chat, 61.0);
        let event = ChatMessageBuilder::event(
            "node1",
            "node1",
            &ChatMessageBuilder::stats(cold_stats()),
        );
        program.run(&chat, event).unwrap();
        chat.clear();

        let hot = json!({"pump_oil": true, "pump_water": true, "therm_oil": 110.0, "therm_water": 105.0});
        let event =
            ChatMessageBuilder::event("node1", "node1", &ChatMessageBuilder::stats(hot));
        program.run(&chat, event).unwrap();

        assert_eq!(
            chat.sent_to("#node1"),
            vec![
                "cmd::chng::pump_oil,off".to_string(),
                "cmd::chng::pump_water,off".to_string(),
                "cmd::func::miner::stop".to_string(),
            ]
        );
        assert_eq!(program.phase(), "rest");
    }

    #[test]
    fn test_missing_miner_snapshot_fails_fast() {
        let chat = MockChatClient::new();
        let mut program = Program::new(HydronicLoop::build(&[]));

        let event = ChatMessageBuilder::event(
            "node1",
            "node1",
            &ChatMessageBuilder::stats(cold_stats()),
        );
        let result = program.run(&chat, event);

        assert!(matches!(result, Err(ControlError::MissingData(_))));
        assert_eq!(chat.send_count(), 0);
    }

    #[test]
    fn test_fleet_max_temp_converts_and_takes_max() {
        let fleet = json!({
            "asic0": { "board_0": { "board": 61.0, "chip": 71.0 }, "board_1": { "board": 58.5, "chip": 70.0 } },
            "asic1": { "board_0": { "board": 49.0, "chip": 60.0 } }
        });
        // 61°C -> 141.8°F est le maximum
        assert_eq!(fleet_max_temp(&fleet), Some(141.8));
    }

    #[test]
    fn test_fleet_max_temp_rejects_unusable_snapshots() {
        assert_eq!(fleet_max_temp(&json!({})), None);
        assert_eq!(fleet_max_temp(&json!({"asic0": {}})), None);
        // board sans lecture numérique: tout le snapshot est inexploitable
        assert_eq!(
            fleet_max_temp(&json!({"asic0": {"board_0": {"chip": 71.0}}})),
            None
        );
    }
}
