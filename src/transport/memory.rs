use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, mpsc};

use crate::error::{TransportError, TransportResult};
use crate::transport::{Transport, TransportStats};

pub const DEFAULT_CAPACITY: usize = 1024;

/// Configuration for the in-process transport pair.
#[derive(Clone, Debug)]
pub struct MemoryConfig {
    pub capacity: usize,
    pub write_timeout: Option<Duration>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            write_timeout: Some(Duration::from_secs(5)),
        }
    }
}

impl MemoryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout;
        self
    }
}

/// In-process transport; one end of a connected pair.
///
/// Useful for tests and for linking two emitters inside one process.
pub struct MemoryTransport {
    sender: Mutex<Option<mpsc::Sender<Bytes>>>,
    receiver: AsyncMutex<mpsc::Receiver<Bytes>>,
    config: MemoryConfig,
    connected: AtomicBool,
    stats: Arc<Mutex<TransportStats>>,
    name: String,
}

impl MemoryTransport {
    /// Create a pair of connected transports.
    pub fn create_pair(
        name: impl Into<String>,
        config: MemoryConfig,
    ) -> TransportResult<(Self, Self)> {
        let name = name.into();
        let capacity = config.capacity.max(1);

        let (tx1, rx1) = mpsc::channel(capacity);
        let (tx2, rx2) = mpsc::channel(capacity);

        let parent = Self::new(tx1, rx2, config.clone(), format!("{}-parent", name));
        let child = Self::new(tx2, rx1, config, format!("{}-child", name));

        Ok((parent, child))
    }

    fn new(
        sender: mpsc::Sender<Bytes>,
        receiver: mpsc::Receiver<Bytes>,
        config: MemoryConfig,
        name: String,
    ) -> Self {
        Self {
            sender: Mutex::new(Some(sender)),
            receiver: AsyncMutex::new(receiver),
            config,
            connected: AtomicBool::new(true),
            stats: Arc::new(Mutex::new(TransportStats::default())),
            name,
        }
    }

    fn closed(&self) -> TransportError {
        self.connected.store(false, Ordering::Release);
        TransportError::SendFailed {
            attempts: 1,
            reason: "Channel closed".into(),
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, data: &[u8]) -> TransportResult<()> {
        let Some(sender) = self.sender.lock().clone() else {
            return Err(TransportError::NotConnected);
        };
        let bytes = Bytes::copy_from_slice(data);

        let result = if let Some(timeout) = self.config.write_timeout {
            match tokio::time::timeout(timeout, sender.send(bytes)).await {
                Ok(sent) => sent.map_err(|_| self.closed()),
                Err(_) => Err(TransportError::Timeout {
                    duration_ms: timeout.as_millis() as u64,
                    operation: "memory send".into(),
                }),
            }
        } else {
            sender.send(bytes).await.map_err(|_| self.closed())
        };

        self.stats.lock().record_send(&result, data.len());
        result
    }

    async fn recv(&self) -> TransportResult<Bytes> {
        let received = self.receiver.lock().await.recv().await;
        let result = received.ok_or_else(|| {
            // every sender on the peer side is gone
            self.connected.store(false, Ordering::Release);
            TransportError::ReceiveFailed {
                attempts: 1,
                reason: "peer closed".into(),
            }
        });

        let len = result.as_ref().map_or(0, Bytes::len);
        self.stats.lock().record_recv(&result, len);
        result
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn close(&self) -> TransportResult<()> {
        self.connected.store(false, Ordering::Release);
        self.sender.lock().take();
        Ok(())
    }

    fn stats(&self) -> Option<TransportStats> {
        Some(self.stats.lock().clone())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_transport_bidirectional() {
        let (t1, t2) = MemoryTransport::create_pair("test", MemoryConfig::default()).unwrap();

        t1.send(b"Hello from parent").await.unwrap();
        let msg = t2.recv().await.unwrap();
        assert_eq!(msg.as_ref(), b"Hello from parent");

        t2.send(b"Hello from child").await.unwrap();
        let msg = t1.recv().await.unwrap();
        assert_eq!(msg.as_ref(), b"Hello from child");
    }

    #[tokio::test]
    async fn test_transport_preserves_order() {
        let (t1, t2) = MemoryTransport::create_pair("order", MemoryConfig::default()).unwrap();

        for i in 0..10u8 {
            t1.send(&[i]).await.unwrap();
        }
        for i in 0..10u8 {
            assert_eq!(t2.recv().await.unwrap().as_ref(), &[i]);
        }
    }

    #[tokio::test]
    async fn test_transport_stats() {
        let (t1, t2) = MemoryTransport::create_pair("test", MemoryConfig::default()).unwrap();

        t1.send(b"test").await.unwrap();
        t2.recv().await.unwrap();

        let stats1 = t1.stats().unwrap();
        assert_eq!(stats1.messages_sent, 1);
        assert_eq!(stats1.bytes_sent, 4);

        let stats2 = t2.stats().unwrap();
        assert_eq!(stats2.messages_received, 1);
        assert_eq!(stats2.bytes_received, 4);
    }

    #[tokio::test]
    async fn test_close_disconnects_peer() {
        let (t1, t2) = MemoryTransport::create_pair("close", MemoryConfig::default()).unwrap();

        t1.close().await.unwrap();
        assert!(!t1.is_connected());
        assert!(matches!(
            t1.send(b"late").await,
            Err(TransportError::NotConnected)
        ));

        assert!(matches!(
            t2.recv().await,
            Err(TransportError::ReceiveFailed { .. })
        ));
        assert!(!t2.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_channel_times_out() {
        let config = MemoryConfig::new()
            .with_capacity(1)
            .with_write_timeout(Some(Duration::from_millis(50)));
        let (t1, _t2) = MemoryTransport::create_pair("full", config).unwrap();

        t1.send(b"first").await.unwrap();
        assert!(matches!(
            t1.send(b"second").await,
            Err(TransportError::Timeout { duration_ms: 50, .. })
        ));
        assert_eq!(t1.stats().unwrap().send_errors, 1);
    }
}
