/**
 * CATALOGUE DES PROGRAMMES - Stratégies de contrôle disponibles
 *
 * RÔLE : Registre explicite nom -> fabrique. L'intake résout le nom en
 * minuscules et rejette tout identifiant inconnu ; aucun dispatch dynamique
 * sur des noms de types.
 */

mod hydronic;
mod presence;
mod thermostat;

pub use hydronic::HydronicLoop;
pub use presence::PresenceHeat;
pub use thermostat::ThermostatHold;

use crate::program::ProgramFunction;
use caldera_core::ControlError;
use serde_json::Value;

type Factory = fn(&[String]) -> Box<dyn ProgramFunction>;

/// Lister ici tous les programmes connus du contrôleur
pub const CATALOG: &[(&str, Factory)] = &[
    ("thermostathold", ThermostatHold::build),
    ("hydronicloop", HydronicLoop::build),
    ("presenceheat", PresenceHeat::build),
];

/// Construit une fonction par son nom (insensible à la casse).
/// None pour un identifiant inconnu : l'appelant décide de l'erreur.
pub fn build(name: &str, ctor_args: &[String]) -> Option<Box<dyn ProgramFunction>> {
    let wanted = name.to_ascii_lowercase();
    CATALOG
        .iter()
        .find(|(known, _)| *known == wanted)
        .map(|(_, factory)| factory(ctor_args))
}

/// Champ numérique d'un snapshot JSON ; tolère les booléens (false=0, true=1)
/// comme le faisait la coercition historique des stats.
pub(crate) fn field_f64(stats: &Value, key: &str) -> Option<f64> {
    match stats.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Champ booléen d'un snapshot JSON ; un nombre non nul vaut vrai
pub(crate) fn field_bool(stats: &Value, key: &str) -> Option<bool> {
    match stats.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|v| v != 0.0),
        _ => None,
    }
}

/// Décode le payload JSON d'un événement d'historique matché par tag.
/// Échec rapide : donnée absente ou JSON invalide ne produisent jamais de
/// valeurs devinées, la stratégie ne fait rien sur ce run.
pub(crate) fn decode_tagged_json(
    event_text: Option<&str>,
    type_tag: &str,
) -> Result<Value, ControlError> {
    let text = event_text
        .ok_or_else(|| ControlError::MissingData(format!("no \"{}\" in history", type_tag)))?;
    let message = caldera_core::Message::parse(text);
    let payload = message.payload().ok_or_else(|| {
        ControlError::MissingData(format!("\"{}\" message carries no payload", type_tag))
    })?;
    serde_json::from_str(&payload)
        .map_err(|e| ControlError::Decode(format!("unable to decode {} json: {}", type_tag, e)))
}
