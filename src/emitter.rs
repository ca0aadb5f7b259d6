//! # Sticky-event emitter over an IPC transport.
//!
//! [`IpcEventEmitter`] sends named events to the process at the other end of
//! a [`Transport`] and dispatches the events that process sends back to
//! locally registered listeners.
//!
//! ## Pinned events
//! `pin(name, args)` makes the *receiving* side remember `args` for `name`.
//! From then on, a listener registered there for `name`:
//! - with `on`/`add_listener`/`prepend_listener` is invoked immediately with
//!   the pinned arguments and stays registered for later emits;
//! - with `once`/`prepend_once_listener` is invoked immediately and is never
//!   registered.
//!
//! `unpin(name)` forgets the pinned arguments; listeners are not touched.
//!
//! ## Tasks
//! Construction spawns two tasks on the current Tokio runtime:
//! ```text
//!   emit/pin/unpin ──► queue ──► writer task ──► Transport::send
//!   Transport::recv ──► reader task ──► dispatch ──► listeners
//! ```
//! The reader holds only a weak reference to the emitter. Dropping the last
//! handle (or calling [`disconnect`](IpcEventEmitter::disconnect)) stops both.
//!
//! ## Listeners
//! A listener receives the emitter handle it was registered on together with
//! the event arguments, and may call any emitter method from inside the
//! callback. Capturing a clone of the emitter inside its own listener creates
//! a reference cycle that keeps the tasks alive; use the handle argument.
//!
//! Listeners must not panic. A panic raised during inbound dispatch ends the
//! reader task: no further events are delivered and `is_connected()` turns
//! false. Sending keeps working.

use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio_util::sync::CancellationToken;

use crate::codec::{Codec, JsonCodec};
use crate::config::EmitterConfig;
use crate::dispatch::EventState;
use crate::envelope::{ERROR_EVENT, Envelope};
use crate::error::{EmitterError, Result};
use crate::logging::WireLog;
use crate::registry::RegistrationKind;
use crate::sender::{PendingSend, Sender, write_loop};
use crate::transport::Transport;

type ListenerFn = dyn Fn(&IpcEventEmitter, &[Value]) + Send + Sync;

struct Shared {
    state: Mutex<EventState<ListenerFn>>,
    sender: Sender,
    transport: Arc<dyn Transport>,
    connected: AtomicBool,
    shutdown: CancellationToken,
    config: EmitterConfig,
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Cloneable handle to one end of a sticky-event channel.
#[derive(Clone)]
pub struct IpcEventEmitter {
    shared: Arc<Shared>,
}

impl IpcEventEmitter {
    /// Wrap `transport` with the default configuration and JSON codec.
    pub fn new<T: Transport + 'static>(transport: T) -> Result<Self> {
        Self::with_config(transport, EmitterConfig::default())
    }

    pub fn with_config<T: Transport + 'static>(transport: T, config: EmitterConfig) -> Result<Self> {
        Self::with_codec_and_config(transport, JsonCodec, config)
    }

    /// Wrap `transport`, encoding envelopes with `codec`.
    ///
    /// Fails with `InvalidArgument` if the transport is not connected, if the
    /// configured timeout is zero, or if called outside a Tokio runtime.
    pub fn with_codec_and_config<T, C>(transport: T, codec: C, config: EmitterConfig) -> Result<Self>
    where
        T: Transport + 'static,
        C: Codec + Clone + 'static,
    {
        if !transport.is_connected() {
            return Err(EmitterError::InvalidArgument(format!(
                "Invalid transport; expected a connected transport, got: {}",
                transport.name()
            )));
        }
        config.validate()?;

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            EmitterError::InvalidArgument("IpcEventEmitter requires a Tokio runtime".into())
        })?;

        let transport = Arc::new(transport);
        let (sender, queue) = Sender::new(config.timeout, transport.send_primitive());
        let shutdown = CancellationToken::new();
        let wire = WireLog::new(&config);

        let shared = Arc::new(Shared {
            state: Mutex::new(EventState::new()),
            sender,
            transport: transport.clone(),
            connected: AtomicBool::new(true),
            shutdown: shutdown.clone(),
            config,
        });

        runtime.spawn(write_loop(
            transport.clone(),
            codec.clone(),
            queue,
            shutdown.clone(),
            wire.clone(),
        ));
        runtime.spawn(read_loop(
            Arc::downgrade(&shared),
            transport,
            codec,
            shutdown,
            wire,
        ));

        tracing::debug!(
            instance = %shared.config.name,
            transport = shared.transport.name(),
            timeout = ?shared.config.timeout,
            "emitter started"
        );

        Ok(Self { shared })
    }

    /// Append a persistent listener; replayed now if `name` is pinned.
    pub fn on<F>(&self, name: impl Into<String>, listener: F) -> &Self
    where
        F: Fn(&IpcEventEmitter, &[Value]) + Send + Sync + 'static,
    {
        self.register(name.into(), RegistrationKind::PersistentAppend, listener)
    }

    /// Same as [`on`](Self::on).
    pub fn add_listener<F>(&self, name: impl Into<String>, listener: F) -> &Self
    where
        F: Fn(&IpcEventEmitter, &[Value]) + Send + Sync + 'static,
    {
        self.register(name.into(), RegistrationKind::PersistentAppend, listener)
    }

    /// Prepend a persistent listener; replayed now if `name` is pinned.
    pub fn prepend_listener<F>(&self, name: impl Into<String>, listener: F) -> &Self
    where
        F: Fn(&IpcEventEmitter, &[Value]) + Send + Sync + 'static,
    {
        self.register(name.into(), RegistrationKind::PersistentPrepend, listener)
    }

    /// Append a one-shot listener, or invoke it right away if `name` is pinned.
    pub fn once<F>(&self, name: impl Into<String>, listener: F) -> &Self
    where
        F: Fn(&IpcEventEmitter, &[Value]) + Send + Sync + 'static,
    {
        self.register(name.into(), RegistrationKind::OnceAppend, listener)
    }

    /// Prepend a one-shot listener, or invoke it right away if `name` is pinned.
    pub fn prepend_once_listener<F>(&self, name: impl Into<String>, listener: F) -> &Self
    where
        F: Fn(&IpcEventEmitter, &[Value]) + Send + Sync + 'static,
    {
        self.register(name.into(), RegistrationKind::OncePrepend, listener)
    }

    fn register<F>(&self, name: String, kind: RegistrationKind, listener: F) -> &Self
    where
        F: Fn(&IpcEventEmitter, &[Value]) + Send + Sync + 'static,
    {
        let listener: Arc<ListenerFn> = Arc::new(listener);
        let replay = self
            .shared
            .state
            .lock()
            .register(&name, kind, listener.clone());

        if let Some(args) = replay {
            listener(self, &args);
        }
        self
    }

    /// Fire `name` with `args` in the remote process.
    pub fn emit(&self, name: impl Into<String>, args: Vec<Value>) -> Result<PendingSend> {
        let name = checked_name(name.into())?;
        Ok(self.shared.sender.send(Envelope::Emit { name, args }))
    }

    /// Fire `name` in the remote process and pin it there.
    ///
    /// `"error"` cannot be pinned; that fails here and nothing is sent.
    pub fn pin(&self, name: impl Into<String>, args: Vec<Value>) -> Result<PendingSend> {
        let name = checked_name(name.into())?;
        if name == ERROR_EVENT {
            return Err(EmitterError::InvalidArgument(
                "\"error\" events cannot be pinned".into(),
            ));
        }
        Ok(self.shared.sender.send(Envelope::Pin { name, args }))
    }

    /// Remove the pin for `name` in the remote process.
    pub fn unpin(&self, name: impl Into<String>) -> Result<PendingSend> {
        let name = checked_name(name.into())?;
        Ok(self.shared.sender.send(Envelope::Unpin { name }))
    }

    /// Arguments pinned locally for `name` by the remote process.
    pub fn pinned(&self, name: &str) -> Option<Vec<Value>> {
        self.shared.state.lock().pins().get(name).map(<[Value]>::to_vec)
    }

    pub fn is_pinned(&self, name: &str) -> bool {
        self.shared.state.lock().pins().contains(name)
    }

    pub fn pinned_names(&self) -> Vec<String> {
        self.shared
            .state
            .lock()
            .pins()
            .names()
            .map(str::to_string)
            .collect()
    }

    pub fn listener_count(&self, name: &str) -> usize {
        self.shared.state.lock().listeners().listener_count(name)
    }

    pub fn event_names(&self) -> Vec<String> {
        self.shared.state.lock().listeners().event_names()
    }

    /// Remove every listener for `name`, or for all events when `None`.
    /// Pins are kept.
    pub fn remove_all_listeners(&self, name: Option<&str>) -> &Self {
        self.shared.state.lock().listeners_mut().remove_all(name);
        self
    }

    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    pub fn config(&self) -> &EmitterConfig {
        &self.shared.config
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire) && self.shared.transport.is_connected()
    }

    /// Stop both tasks and close the transport. Sends still queued resolve
    /// as `Closed`.
    pub async fn disconnect(&self) -> Result<()> {
        self.shared.connected.store(false, Ordering::Release);
        self.shared.shutdown.cancel();
        self.shared.transport.close().await?;
        tracing::debug!(instance = %self.shared.config.name, "disconnected");
        Ok(())
    }

    /// Apply one inbound envelope and run the listeners it selects.
    pub(crate) fn dispatch(&self, envelope: Envelope) {
        let delivery = self.shared.state.lock().dispatch(envelope);
        let Some(delivery) = delivery else {
            return;
        };

        if delivery.listeners.is_empty() && delivery.name == ERROR_EVENT {
            tracing::warn!(
                instance = %self.shared.config.name,
                args = ?delivery.args,
                "unhandled \"error\" event from peer"
            );
        }

        for listener in &delivery.listeners {
            listener(self, &delivery.args);
        }
    }
}

impl std::fmt::Debug for IpcEventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpcEventEmitter")
            .field("name", &self.shared.config.name)
            .field("transport", &self.shared.transport)
            .field("connected", &self.is_connected())
            .finish()
    }
}

fn checked_name(name: String) -> Result<String> {
    if name.is_empty() {
        return Err(EmitterError::InvalidArgument(
            "Invalid event name; expected a non-empty string".into(),
        ));
    }
    Ok(name)
}

/// Marks the emitter disconnected however the reader ends, including a
/// listener panic unwinding through it.
struct ReaderExit(Weak<Shared>);

impl Drop for ReaderExit {
    fn drop(&mut self) {
        let Some(shared) = self.0.upgrade() else {
            return;
        };
        shared.connected.store(false, Ordering::Release);
        if std::thread::panicking() {
            tracing::error!(
                instance = %shared.config.name,
                "listener panicked; inbound dispatch stopped"
            );
        }
    }
}

async fn read_loop<T: Transport, C: Codec>(
    shared: Weak<Shared>,
    transport: Arc<T>,
    codec: C,
    shutdown: CancellationToken,
    wire: WireLog,
) {
    let exit = ReaderExit(shared);

    loop {
        let received = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            received = transport.recv() => received,
        };

        let bytes = match received {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::debug!(instance = wire.name(), error = %e, "transport closed");
                break;
            }
        };

        let Some(envelope) = Envelope::decode(&codec, &bytes) else {
            tracing::trace!(
                instance = wire.name(),
                len = bytes.len(),
                "dropping foreign payload"
            );
            continue;
        };

        let Some(strong) = exit.0.upgrade() else {
            break;
        };
        wire.inbound(&envelope);
        IpcEventEmitter { shared: strong }.dispatch(envelope);
    }

    tracing::debug!(instance = wire.name(), "reader stopped");
}
