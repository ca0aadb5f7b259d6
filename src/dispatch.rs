//! Dispatch engine: the state transition applied for each inbound envelope.
//!
//! [`EventState`] owns the pin store and the listener registry. Its methods
//! only mutate state and report which callbacks must run; the caller invokes
//! them after releasing its lock, so a callback can re-enter the emitter.
//!
//! ## Pin before emit
//! A `Pin` writes the pin store *before* the listener snapshot is handed back.
//! A listener invoked for that pin which registers another listener for the
//! same event therefore finds the event pinned and gets it replayed.

use serde_json::Value;
use std::sync::Arc;

use crate::envelope::{ERROR_EVENT, Envelope};
use crate::pins::PinStore;
use crate::registry::{ListenerRegistry, RegistrationKind};

/// Callbacks to invoke for one dispatched event, in order, with `args`.
pub struct Delivery<F: ?Sized> {
    pub name: String,
    pub args: Vec<Value>,
    pub listeners: Vec<Arc<F>>,
}

pub struct EventState<F: ?Sized> {
    pins: PinStore,
    listeners: ListenerRegistry<F>,
}

impl<F: ?Sized> EventState<F> {
    pub fn new() -> Self {
        Self {
            pins: PinStore::new(),
            listeners: ListenerRegistry::new(),
        }
    }

    /// Apply one inbound envelope. `Unpin` never produces a delivery.
    pub fn dispatch(&mut self, envelope: Envelope) -> Option<Delivery<F>> {
        match envelope {
            Envelope::Emit { name, args } => Some(self.deliver(name, args)),
            Envelope::Pin { name, args } => {
                if name == ERROR_EVENT {
                    tracing::warn!("peer pinned the reserved \"error\" event; delivering unpinned");
                } else {
                    self.pins.pin(name.clone(), args.clone());
                }
                Some(self.deliver(name, args))
            }
            Envelope::Unpin { name } => {
                self.pins.unpin(&name);
                None
            }
        }
    }

    /// Register `callback` for `name`.
    ///
    /// Returns the pinned arguments when the callback must be replayed
    /// immediately. A one-shot callback for a pinned event is replayed and not
    /// stored.
    pub fn register(
        &mut self,
        name: &str,
        kind: RegistrationKind,
        callback: Arc<F>,
    ) -> Option<Vec<Value>> {
        let pinned = self.pins.get(name).map(<[Value]>::to_vec);

        match (kind, pinned) {
            (
                RegistrationKind::OnceAppend | RegistrationKind::OncePrepend,
                Some(args),
            ) => Some(args),
            (
                RegistrationKind::PersistentAppend | RegistrationKind::PersistentPrepend,
                Some(args),
            ) => {
                self.listeners.insert(name, kind, callback);
                Some(args)
            }
            (_, None) => {
                self.listeners.insert(name, kind, callback);
                None
            }
        }
    }

    pub fn pins(&self) -> &PinStore {
        &self.pins
    }

    pub fn listeners(&self) -> &ListenerRegistry<F> {
        &self.listeners
    }

    pub fn listeners_mut(&mut self) -> &mut ListenerRegistry<F> {
        &mut self.listeners
    }

    fn deliver(&mut self, name: String, args: Vec<Value>) -> Delivery<F> {
        let listeners = self.listeners.take_for_emit(&name);
        Delivery {
            name,
            args,
            listeners,
        }
    }
}

impl<F: ?Sized> Default for EventState<F> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    type Tag = &'static str;

    fn emit(name: &str, args: Vec<Value>) -> Envelope {
        Envelope::Emit {
            name: name.into(),
            args,
        }
    }

    fn pin(name: &str, args: Vec<Value>) -> Envelope {
        Envelope::Pin {
            name: name.into(),
            args,
        }
    }

    fn unpin(name: &str) -> Envelope {
        Envelope::Unpin { name: name.into() }
    }

    #[test]
    fn test_emit_delivers_to_registered_listeners() {
        let mut state = EventState::<Tag>::new();
        assert!(
            state
                .register("ready", RegistrationKind::PersistentAppend, Arc::new("a"))
                .is_none()
        );

        let delivery = state.dispatch(emit("ready", vec![json!(1)])).unwrap();
        assert_eq!(delivery.name, "ready");
        assert_eq!(delivery.args, vec![json!(1)]);
        assert_eq!(delivery.listeners.len(), 1);
        assert!(!state.pins().contains("ready"));
    }

    #[test]
    fn test_pin_is_recorded_before_delivery() {
        let mut state = EventState::<Tag>::new();
        state.register("ready", RegistrationKind::PersistentAppend, Arc::new("a"));

        let delivery = state.dispatch(pin("ready", vec![json!(1), json!(2)])).unwrap();

        // a listener running for this delivery would register against this state
        let replay = state.register("ready", RegistrationKind::OnceAppend, Arc::new("late"));
        assert_eq!(replay, Some(vec![json!(1), json!(2)]));
        assert_eq!(delivery.listeners.len(), 1);
    }

    #[test]
    fn test_persistent_replay_keeps_registration() {
        let mut state = EventState::<Tag>::new();
        state.dispatch(pin("ready", vec![json!("x")]));

        let replay = state.register("ready", RegistrationKind::PersistentPrepend, Arc::new("p"));
        assert_eq!(replay, Some(vec![json!("x")]));
        assert_eq!(state.listeners().listener_count("ready"), 1);
    }

    #[test]
    fn test_once_replay_is_not_registered() {
        let mut state = EventState::<Tag>::new();
        state.dispatch(pin("ready", vec![]));

        assert_eq!(
            state.register("ready", RegistrationKind::OnceAppend, Arc::new("o")),
            Some(vec![])
        );
        assert_eq!(
            state.register("ready", RegistrationKind::OncePrepend, Arc::new("p")),
            Some(vec![])
        );
        assert_eq!(state.listeners().listener_count("ready"), 0);

        let delivery = state.dispatch(emit("ready", vec![])).unwrap();
        assert!(delivery.listeners.is_empty());
    }

    #[test]
    fn test_unpin_only_touches_pins() {
        let mut state = EventState::<Tag>::new();
        state.dispatch(pin("ready", vec![json!(1)]));
        state.register("ready", RegistrationKind::PersistentAppend, Arc::new("a"));

        assert!(state.dispatch(unpin("ready")).is_none());
        assert!(!state.pins().contains("ready"));
        assert_eq!(state.listeners().listener_count("ready"), 1);

        assert!(
            state
                .register("ready", RegistrationKind::PersistentAppend, Arc::new("b"))
                .is_none()
        );
    }

    #[test]
    fn test_error_event_is_never_pinned() {
        let mut state = EventState::<Tag>::new();
        state.register("error", RegistrationKind::PersistentAppend, Arc::new("e"));

        let delivery = state.dispatch(pin("error", vec![json!("boom")])).unwrap();
        assert_eq!(delivery.listeners.len(), 1);
        assert!(!state.pins().contains("error"));
    }
}
