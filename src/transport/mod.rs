//! Byte channels an emitter can run over.
//!
//! - [`memory`]: in-process pair, for tests and same-process wiring
//! - [`stream`]: length-prefixed frames over any async byte stream
//! - [`unix`]: Unix domain sockets (unix only)
//! - [`process`]: a parent and its child over the child's stdio

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt::Debug;
use std::sync::Arc;

use crate::error::{SendPrimitive, TransportResult};

pub mod memory;
pub mod process;
pub mod stream;
#[cfg(unix)]
pub mod unix;

/// One end of a bidirectional, ordered payload channel.
///
/// A successful `send` is the acknowledgement the emitter waits for, so an
/// implementation should only return once the payload has left its hands.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    async fn send(&self, data: &[u8]) -> TransportResult<()>;

    /// Next payload from the peer, in the order the peer sent them. An error
    /// means the channel is unusable from now on.
    async fn recv(&self) -> TransportResult<Bytes>;

    fn is_connected(&self) -> bool;

    async fn close(&self) -> TransportResult<()>;

    fn stats(&self) -> Option<TransportStats> {
        None
    }

    /// Identifier used in logs and error messages.
    fn name(&self) -> &str {
        "unknown"
    }

    /// Which step a completed `send` stands for; shown in timeout errors.
    fn send_primitive(&self) -> SendPrimitive {
        SendPrimitive::Send
    }
}

/// Payload counters kept by the bundled transports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub send_errors: u64,
    pub recv_errors: u64,
}

impl TransportStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one send attempt of `bytes` on the wire.
    pub fn record_send<T>(&mut self, result: &TransportResult<T>, bytes: usize) {
        match result {
            Ok(_) => {
                self.messages_sent += 1;
                self.bytes_sent += bytes as u64;
            }
            Err(_) => self.send_errors += 1,
        }
    }

    /// Count one receive attempt; `bytes` is what the payload took on the wire.
    pub fn record_recv<T>(&mut self, result: &TransportResult<T>, bytes: usize) {
        match result {
            Ok(_) => {
                self.messages_received += 1;
                self.bytes_received += bytes as u64;
            }
            Err(_) => self.recv_errors += 1,
        }
    }
}

impl std::fmt::Display for TransportStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "sent {} ({} bytes, {} errors), received {} ({} bytes, {} errors)",
            self.messages_sent,
            self.bytes_sent,
            self.send_errors,
            self.messages_received,
            self.bytes_received,
            self.recv_errors
        )
    }
}

/// Lets a caller keep a handle on a transport it gave to an emitter.
#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, data: &[u8]) -> TransportResult<()> {
        T::send(self, data).await
    }

    async fn recv(&self) -> TransportResult<Bytes> {
        T::recv(self).await
    }

    fn is_connected(&self) -> bool {
        T::is_connected(self)
    }

    async fn close(&self) -> TransportResult<()> {
        T::close(self).await
    }

    fn stats(&self) -> Option<TransportStats> {
        T::stats(self)
    }

    fn name(&self) -> &str {
        T::name(self)
    }

    fn send_primitive(&self) -> SendPrimitive {
        T::send_primitive(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;

    #[test]
    fn test_stats_recording() {
        let mut stats = TransportStats::new();
        stats.record_send(&Ok(()), 10);
        stats.record_send::<()>(&Err(TransportError::NotConnected), 10);
        stats.record_recv(&Ok(()), 4);

        assert_eq!(stats.messages_sent, 1);
        assert_eq!(stats.bytes_sent, 10);
        assert_eq!(stats.send_errors, 1);
        assert_eq!(stats.messages_received, 1);
        assert_eq!(
            stats.to_string(),
            "sent 1 (10 bytes, 1 errors), received 1 (4 bytes, 0 errors)"
        );
    }
}
