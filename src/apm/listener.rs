use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::apm::event::{
    ServerAdded, ServerDescriptionChanged, ServerRemoved, TopologyChanged,
};

/// Receives topology events. Every method has a no-op default, so handlers
/// implement only the hooks they care about.
pub trait EventHandler: Send + Sync {
    fn on_server_added(&self, _event: &ServerAdded) {}
    fn on_server_removed(&self, _event: &ServerRemoved) {}
    fn on_server_description_changed(&self, _event: &ServerDescriptionChanged) {}
    fn on_topology_changed(&self, _event: &TopologyChanged) {}
}

/// Dispatches topology events to registered handlers.
pub struct Listener {
    no_handlers: AtomicBool,
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
}

impl Listener {
    pub fn new() -> Listener {
        Listener {
            no_handlers: AtomicBool::new(true),
            handlers: RwLock::new(Vec::new()),
        }
    }

    pub fn add_handler(&self, handler: Arc<dyn EventHandler>) {
        let mut guard = self.handlers.write().unwrap();
        self.no_handlers.store(false, Ordering::SeqCst);
        guard.push(handler);
    }

    pub fn server_added(&self, event: &ServerAdded) {
        if self.no_handlers.load(Ordering::SeqCst) {
            return;
        }
        for handler in self.handlers.read().unwrap().iter() {
            handler.on_server_added(event);
        }
    }

    pub fn server_removed(&self, event: &ServerRemoved) {
        if self.no_handlers.load(Ordering::SeqCst) {
            return;
        }
        for handler in self.handlers.read().unwrap().iter() {
            handler.on_server_removed(event);
        }
    }

    pub fn server_description_changed(&self, event: &ServerDescriptionChanged) {
        if self.no_handlers.load(Ordering::SeqCst) {
            return;
        }
        for handler in self.handlers.read().unwrap().iter() {
            handler.on_server_description_changed(event);
        }
    }

    pub fn topology_changed(&self, event: &TopologyChanged) {
        if self.no_handlers.load(Ordering::SeqCst) {
            return;
        }
        for handler in self.handlers.read().unwrap().iter() {
            handler.on_topology_changed(event);
        }
    }
}

impl Default for Listener {
    fn default() -> Listener {
        Listener::new()
    }
}
