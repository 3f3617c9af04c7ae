use crate::program::{ProgramCtx, ProgramFunction, RunOutcome, RunResult, PHASE_REST};
use crate::programs::{decode_tagged_json, field_bool, field_f64};
use caldera_core::{tag, ChatSender as _, ControlError};

const PHASE_MINE: &str = "mine";
const PHASE_PUMP: &str = "pump";
const TRIGGER_TEMP: f64 = 75.0;

/// Déclenchement de chauffe sur présence de main (capteur hall).
///
/// rest --[therm1 > 75]--> mine --[therm2 > 75]--> pump --[therm1 < 75]--> rest
///
/// Les blocs de phase se relisent en cascade dans un même run : si les deux
/// seuils sont déjà franchis, rest peut enchaîner jusqu'à pump sur un seul
/// événement. Pas d'état terminal, le cycle tourne tant que le programme vit.
pub struct PresenceHeat;

impl PresenceHeat {
    pub fn build(_ctor_args: &[String]) -> Box<dyn ProgramFunction> {
        Box::new(Self)
    }
}

impl ProgramFunction for PresenceHeat {
    fn name(&self) -> &'static str {
        "PresenceHeat"
    }

    fn run(&mut self, ctx: &mut ProgramCtx<'_>) -> RunResult {
        let stats_text = ctx.find(tag::STATS, None).map(|e| e.text.clone());
        let stats = decode_tagged_json(stats_text.as_deref(), tag::STATS)?;

        if ctx.first_run() {
            ctx.set_phase(PHASE_REST);
            println!("[programs] setting program phase to \"{}\"", PHASE_REST);
        }

        let hall1 = field_f64(&stats, "hall1");
        let pump1 = field_bool(&stats, "pump1");
        let therm1 = field_f64(&stats, "therm1");
        let therm2 = field_f64(&stats, "therm2");

        let (Some(_hall1), Some(_pump1), Some(therm1), Some(therm2)) = (hall1, pump1, therm1, therm2)
        else {
            return Err(ControlError::MissingData(format!(
                "unable to get needed stats: {:?}",
                ["hall1", "pump1", "therm1", "therm2"]
            )));
        };

        let target = ctx.reply_target().to_string();
        let mut acted = false;

        // système au repos : la chaleur détectée déclenche le minage
        if ctx.phase() == PHASE_REST && therm1 > TRIGGER_TEMP {
            ctx.chat.send(&target, "cmd::func::miner::start");
            ctx.set_phase(PHASE_MINE);
            acted = true;
        }

        // le circuit secondaire est chaud : on coupe et on pompe
        if ctx.phase() == PHASE_MINE && therm2 > TRIGGER_TEMP {
            ctx.chat.send(&target, "cmd::func::miner::stop");
            ctx.chat.send(&target, "cmd::chng::pump1,on");
            ctx.set_phase(PHASE_PUMP);
            acted = true;
        }

        // la condition d'origine a cessé : retour au repos
        if ctx.phase() == PHASE_PUMP && therm1 < TRIGGER_TEMP {
            ctx.chat.send(&target, "cmd::chng::pump1,off");
            ctx.set_phase(PHASE_REST);
            acted = true;
        }

        Ok(if acted { RunOutcome::Handled } else { RunOutcome::Idle })
    }
}
