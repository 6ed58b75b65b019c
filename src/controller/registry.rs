//! Controller discovery and lookup.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;

use super::Controller;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

type Factory = Arc<dyn Fn() -> Result<Arc<dyn Controller>, BoxError> + Send + Sync>;

/// One discoverable controller.
#[derive(Clone)]
pub struct ControllerEntry {
    pub id: String,

    /// Higher is instantiated (and declares its routes) first.
    pub priority: i32,

    factory: Factory,
}

impl ControllerEntry {
    pub fn new<F>(id: impl Into<String>, priority: i32, factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn Controller>, BoxError> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            priority,
            factory: Arc::new(factory),
        }
    }

    /// Entry for an already constructed controller.
    pub fn instance(id: impl Into<String>, priority: i32, controller: Arc<dyn Controller>) -> Self {
        Self::new(id, priority, move || Ok(Arc::clone(&controller)))
    }

    pub fn instantiate(&self) -> Result<Arc<dyn Controller>, BoxError> {
        (self.factory)()
    }
}

impl fmt::Debug for ControllerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerEntry")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// Controllers known to the application, in discovery order.
#[derive(Debug, Clone, Default)]
pub struct ControllerRegistry {
    entries: Vec<ControllerEntry>,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, id: impl Into<String>, priority: i32, factory: F) -> &mut Self
    where
        F: Fn() -> Result<Arc<dyn Controller>, BoxError> + Send + Sync + 'static,
    {
        self.entries.push(ControllerEntry::new(id, priority, factory));
        self
    }

    pub fn register_instance(
        &mut self,
        id: impl Into<String>,
        priority: i32,
        controller: Arc<dyn Controller>,
    ) -> &mut Self {
        self.entries.push(ControllerEntry::instance(id, priority, controller));
        self
    }

    pub fn entries(&self) -> &[ControllerEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<ControllerEntry> {
        self.entries
    }
}

struct Slot(Arc<dyn Controller>);

/// Frozen id → instance map.
///
/// The set of ids never changes after build; each instance can be swapped.
#[derive(Default)]
pub struct Controllers {
    slots: HashMap<String, ArcSwap<Slot>>,
}

impl Controllers {
    pub(crate) fn insert(&mut self, id: String, controller: Arc<dyn Controller>) {
        self.slots.insert(id, ArcSwap::from_pointee(Slot(controller)));
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Controller>> {
        self.slots.get(id).map(|slot| Arc::clone(&slot.load().0))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.slots.contains_key(id)
    }

    /// Swap the instance behind `id`; returns the previous one.
    ///
    /// Unknown ids are left alone and return `None`. Requests already
    /// running keep the instance they resolved.
    pub fn replace(&self, id: &str, controller: Arc<dyn Controller>) -> Option<Arc<dyn Controller>> {
        let slot = self.slots.get(id)?;
        let previous = slot.swap(Arc::new(Slot(controller)));
        tracing::info!(controller = %id, "Controller replaced");
        Some(Arc::clone(&previous.0))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl fmt::Debug for Controllers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.slots.keys()).finish()
    }
}
