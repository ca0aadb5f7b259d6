//! ipc-event-emitter - sticky-event messaging between two processes
//!
//! An [`IpcEventEmitter`] wraps one end of a bidirectional [`Transport`].
//! Events emitted on one side are dispatched to listeners on the other.
//! A *pinned* event is also remembered by the receiver, so a listener that
//! registers later still sees it.
pub mod codec;
pub mod config;
pub mod dispatch;
pub mod emitter;
pub mod envelope;
pub mod error;
mod logging;
pub mod pins;
pub mod registry;
pub mod sender;
pub mod transport;

pub use codec::{Codec, JsonCodec};
pub use config::EmitterConfig;
pub use emitter::IpcEventEmitter;
pub use envelope::{Envelope, PROTOCOL_TYPE};
pub use error::{EmitterError, Result, SendPrimitive, TransportError, TransportResult};
pub use registry::RegistrationKind;
pub use sender::PendingSend;
pub use transport::memory::{MemoryConfig, MemoryTransport};
pub use transport::process::{ChildTransport, StdioTransport, from_child, stdio};
pub use transport::stream::{StreamConfig, StreamTransport};
pub use transport::{Transport, TransportStats};

#[cfg(unix)]
pub use transport::unix::{UnixTransport, UnixTransportListener};

#[cfg(feature = "codec-cbor")]
pub use codec::CborCodec;
#[cfg(feature = "codec-messagepack")]
pub use codec::MessagePackCodec;
