/*!
Devkit Caldera

Facilite l'écriture de tests pour le contrôleur et les nœuds avec:
- Mock du transport chat (enregistre tous les envois sortants)
- Builders de messages protocole (stats, miner, control)
- Assertions sur les messages échangés
*/

mod builders;
mod chat_stub;

pub use builders::ChatMessageBuilder;
pub use chat_stub::MockChatClient;
