use crate::topology::Site;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::RwLock;

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// The one lock guarding a control node's site. Async so that writers can
/// keep it across a broadcast.
pub type SharedSite = Arc<RwLock<Site>>;

pub fn new_site(site: Site) -> SharedSite {
    Arc::new(RwLock::new(site))
}
