use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// How a listener is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationKind {
    PersistentAppend,
    PersistentPrepend,
    OnceAppend,
    OncePrepend,
}

impl RegistrationKind {
    pub fn is_once(self) -> bool {
        matches!(
            self,
            RegistrationKind::OnceAppend | RegistrationKind::OncePrepend
        )
    }

    pub fn is_prepend(self) -> bool {
        matches!(
            self,
            RegistrationKind::PersistentPrepend | RegistrationKind::OncePrepend
        )
    }
}

struct Entry<F: ?Sized> {
    once: bool,
    callback: Arc<F>,
}

/// Ordered per-event listener sequences.
///
/// Generic over the callback type so the ordering rules can be tested without
/// an emitter.
pub struct ListenerRegistry<F: ?Sized> {
    events: HashMap<String, VecDeque<Entry<F>>>,
}

impl<F: ?Sized> ListenerRegistry<F> {
    pub fn new() -> Self {
        Self {
            events: HashMap::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, kind: RegistrationKind, callback: Arc<F>) {
        let entry = Entry {
            once: kind.is_once(),
            callback,
        };
        let listeners = self.events.entry(name.into()).or_default();

        if kind.is_prepend() {
            listeners.push_front(entry);
        } else {
            listeners.push_back(entry);
        }
    }

    /// Snapshot the listeners for one live emit, in invocation order.
    ///
    /// One-shot entries are removed as part of taking the snapshot, so they
    /// fire at most once even if the emit re-enters the registry.
    pub fn take_for_emit(&mut self, name: &str) -> Vec<Arc<F>> {
        let Some(listeners) = self.events.get_mut(name) else {
            return Vec::new();
        };

        let snapshot = listeners
            .iter()
            .map(|entry| entry.callback.clone())
            .collect();

        listeners.retain(|entry| !entry.once);
        if listeners.is_empty() {
            self.events.remove(name);
        }

        snapshot
    }

    pub fn listener_count(&self, name: &str) -> usize {
        self.events.get(name).map_or(0, VecDeque::len)
    }

    pub fn event_names(&self) -> Vec<String> {
        self.events.keys().cloned().collect()
    }

    pub fn remove_all(&mut self, name: Option<&str>) {
        match name {
            Some(name) => {
                self.events.remove(name);
            }
            None => self.events.clear(),
        }
    }
}

impl<F: ?Sized> Default for ListenerRegistry<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: ?Sized> std::fmt::Debug for ListenerRegistry<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<&str, usize> = self
            .events
            .iter()
            .map(|(name, listeners)| (name.as_str(), listeners.len()))
            .collect();
        f.debug_struct("ListenerRegistry")
            .field("listeners", &counts)
            .finish()
    }
}
