/**
 * CALDERA CORE - Bibliothèque partagée contrôleur/nœuds
 *
 * RÔLE : Tout ce qui doit être identique des deux côtés du canal chat :
 * le codec du protocole texte, le modèle d'événement, la taxonomie d'erreurs
 * et le writer de métriques InfluxDB.
 *
 * ARCHITECTURE : Aucune dépendance au transport ; le contrôleur et les nœuds
 * branchent leur client MQTT (ou un mock du devkit) sur le trait ChatSender.
 */

mod error;
mod event;
mod influx;
mod message;
mod report;
pub mod temp;

pub use error::ControlError;
pub use event::{topic_for_channel, ChatEnvelope, ChatEvent, ChatSender, CHANNEL_TOPIC_PREFIX};
pub use influx::{InfluxError, InfluxStatWriter};
pub use message::{command, tag, Message, FIELD_SEPARATOR};
pub use report::ErrorReporter;
