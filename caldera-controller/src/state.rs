use parking_lot::Mutex;
use std::sync::Arc;

/// État partagé entre la boucle d'événements, la boucle de stats et l'API.
/// Chaque Program reste possédé par le processeur ; seul le processeur
/// lui-même est derrière ce verrou.
pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}
