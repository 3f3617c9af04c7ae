use crate::program::{ProgramCtx, ProgramFunction, RunOutcome, RunResult, PHASE_REST};
use crate::programs::{decode_tagged_json, field_bool, field_f64};
use caldera_core::{tag, ChatSender as _, ControlError};
use serde_json::Value;

const PHASE_HEATING: &str = "heating";

/// Contrôle mono-seuil d'un relais de chauffe sur la température d'huile.
///
/// rest --[huile < cible]--> heating --[huile > cible]--> rest
/// Les comparaisons sont strictes : une lecture pile sur le seuil ne
/// transitionne pas et n'émet rien, l'écart cible/cible+1 évite le
/// claquement du relais.
pub struct ThermostatHold {
    target_temp: f64,
}

impl ThermostatHold {
    pub fn new(target_temp: f64) -> Self {
        Self { target_temp }
    }

    pub fn build(ctor_args: &[String]) -> Box<dyn ProgramFunction> {
        let target_temp = match ctor_args.first() {
            Some(raw) => raw.parse::<f64>().unwrap_or_else(|_| {
                eprintln!("[programs] non float parsable target used to instantiate ThermostatHold, setting to 0");
                0.0
            }),
            None => 69.0,
        };
        Box::new(Self::new(target_temp))
    }
}

impl ProgramFunction for ThermostatHold {
    fn name(&self) -> &'static str {
        "ThermostatHold"
    }

    fn ctor_args(&self) -> serde_json::Map<String, Value> {
        let mut args = serde_json::Map::new();
        args.insert("target_temp".into(), self.target_temp.into());
        args
    }

    fn run(&mut self, ctx: &mut ProgramCtx<'_>) -> RunResult {
        let stats_text = ctx.find(tag::STATS, None).map(|e| e.text.clone());
        let stats = decode_tagged_json(stats_text.as_deref(), tag::STATS)?;

        if ctx.first_run() {
            ctx.set_phase(PHASE_REST);
            println!("[programs] setting program phase to \"{}\"", PHASE_REST);
        }

        let therm_oil = field_f64(&stats, "therm_oil");
        let relay = field_bool(&stats, "relay");
        let (Some(therm_oil), Some(relay)) = (therm_oil, relay) else {
            return Err(ControlError::MissingData(format!(
                "unable to get needed stats: {:?}",
                ["therm_oil", "relay"]
            )));
        };

        let target = ctx.reply_target().to_string();

        if ctx.phase() == PHASE_REST {
            if therm_oil < self.target_temp {
                if !relay {
                    ctx.chat.send(&target, "cmd::chng::relay,on");
                }
                ctx.set_phase(PHASE_HEATING);
                return Ok(RunOutcome::Handled);
            }
            if therm_oil > self.target_temp {
                if relay {
                    ctx.chat.send(&target, "cmd::chng::relay,off");
                }
                return Ok(RunOutcome::Handled);
            }
        }

        if ctx.phase() == PHASE_HEATING {
            if therm_oil < self.target_temp + 1.0 {
                if !relay {
                    ctx.chat.send(&target, "cmd::chng::relay,on");
                }
                return Ok(RunOutcome::Handled);
            }
            if therm_oil > self.target_temp {
                if relay {
                    ctx.chat.send(&target, "cmd::chng::relay,off");
                }
                ctx.set_phase(PHASE_REST);
                return Ok(RunOutcome::Handled);
            }
        }

        Ok(RunOutcome::Idle)
    }
}
