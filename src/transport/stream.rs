use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex as SyncMutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::error::{TransportError, TransportResult};
use crate::transport::{Transport, TransportStats};

pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Configuration for length-prefixed stream transports.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Maximum message size in bytes
    pub max_message_size: usize,
    /// Write timeout (None for no timeout)
    pub write_timeout: Option<Duration>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            write_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl StreamConfig {
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout;
        self
    }
}

/// Transport over a pair of byte streams with length-prefixed framing.
///
/// Each payload is preceded by its length as a little-endian `u32`. Reads and
/// writes lock independent halves, so one task can block in `recv` while
/// another sends.
pub struct StreamTransport<R, W> {
    config: StreamConfig,
    reader: Mutex<R>,
    /// `None` once closed. Dropping the writer is what releases pipe handles
    /// such as `ChildStdin`; `shutdown` alone leaves them open.
    writer: Mutex<Option<W>>,
    connected: Arc<AtomicBool>,
    stats: Arc<SyncMutex<TransportStats>>,
    name: String,
}

impl<R, W> StreamTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W, name: impl Into<String>, config: StreamConfig) -> Self {
        Self {
            config,
            reader: Mutex::new(reader),
            writer: Mutex::new(Some(writer)),
            connected: Arc::new(AtomicBool::new(true)),
            stats: Arc::new(SyncMutex::new(TransportStats::default())),
            name: name.into(),
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    fn disconnected(&self) {
        self.connected.store(false, Ordering::Release);
    }

    async fn send_bytes(&self, data: &[u8]) -> TransportResult<()> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        if data.len() > self.config.max_message_size {
            return Err(TransportError::MessageTooLarge {
                size: data.len(),
                max: self.config.max_message_size,
            });
        }

        let len_bytes = (data.len() as u32).to_le_bytes();

        let write_op = async {
            let mut guard = self.writer.lock().await;
            let Some(writer) = guard.as_mut() else {
                return Err(TransportError::NotConnected);
            };

            let written = async {
                writer.write_all(&len_bytes).await?;
                writer.write_all(data).await?;
                writer.flush().await?;
                Ok::<(), std::io::Error>(())
            }
            .await;

            written.map_err(|e| {
                self.disconnected();
                TransportError::SendFailed {
                    attempts: 1,
                    reason: e.to_string(),
                }
            })
        };

        let result = if let Some(timeout) = self.config.write_timeout {
            tokio::time::timeout(timeout, write_op)
                .await
                .map_err(|_| TransportError::Timeout {
                    duration_ms: timeout.as_millis() as u64,
                    operation: format!("{} write", self.name),
                })
                .and_then(|written| written)
        } else {
            write_op.await
        };

        self.stats.lock().record_send(&result, data.len() + 4);
        result
    }

    async fn recv_bytes(&self) -> TransportResult<Bytes> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        let read_op = async {
            let mut reader = self.reader.lock().await;

            let mut len_bytes = [0u8; 4];
            reader
                .read_exact(&mut len_bytes)
                .await
                .map_err(|e| self.read_failed(e))?;

            let len = u32::from_le_bytes(len_bytes) as usize;
            if len > self.config.max_message_size {
                // the stream is no longer aligned on a frame boundary
                self.disconnected();
                return Err(TransportError::MessageTooLarge {
                    size: len,
                    max: self.config.max_message_size,
                });
            }

            let mut buffer = vec![0u8; len];
            reader
                .read_exact(&mut buffer)
                .await
                .map_err(|e| self.read_failed(e))?;

            Ok::<Vec<u8>, TransportError>(buffer)
        };

        // unbounded: the peer may stay quiet for as long as it likes, and a
        // cancelled read would leave the stream between frames
        let result = read_op.await;

        let wire_len = result.as_ref().map_or(0, |buffer| buffer.len() + 4);
        self.stats.lock().record_recv(&result, wire_len);
        result.map(Bytes::from)
    }

    fn read_failed(&self, e: std::io::Error) -> TransportError {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            self.disconnected();
        }
        TransportError::ReceiveFailed {
            attempts: 1,
            reason: e.to_string(),
        }
    }
}

#[async_trait]
impl<R, W> Transport for StreamTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&self, data: &[u8]) -> TransportResult<()> {
        self.send_bytes(data).await
    }

    async fn recv(&self) -> TransportResult<Bytes> {
        self.recv_bytes().await
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn close(&self) -> TransportResult<()> {
        self.disconnected();
        let Some(mut writer) = self.writer.lock().await.take() else {
            return Ok(());
        };

        // shutdown signals EOF on sockets; dropping the writer afterwards
        // closes pipes
        writer
            .shutdown()
            .await
            .map_err(|e| TransportError::SendFailed {
                attempts: 1,
                reason: format!("Failed to shut down writer: {}", e),
            })
    }

    fn stats(&self) -> Option<TransportStats> {
        Some(self.stats.lock().clone())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl<R, W> std::fmt::Debug for StreamTransport<R, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTransport")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("connected", &self.connected.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{DuplexStream, ReadHalf, WriteHalf, duplex, split};

    type DuplexTransport = StreamTransport<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;

    fn pair(config: StreamConfig) -> (DuplexTransport, DuplexTransport) {
        let (a, b) = duplex(64 * 1024);
        let (ar, aw) = split(a);
        let (br, bw) = split(b);
        (
            StreamTransport::new(ar, aw, "a", config.clone()),
            StreamTransport::new(br, bw, "b", config),
        )
    }

    #[tokio::test]
    async fn test_stream_send_recv() {
        let (a, b) = pair(StreamConfig::default());

        a.send(b"Hello, stream!").await.unwrap();
        assert_eq!(b.recv().await.unwrap().as_ref(), b"Hello, stream!");

        b.send(b"Hello back!").await.unwrap();
        assert_eq!(a.recv().await.unwrap().as_ref(), b"Hello back!");
    }

    #[tokio::test]
    async fn test_stream_frames_stay_separate() {
        let (a, b) = pair(StreamConfig::default());

        a.send(b"one").await.unwrap();
        a.send(b"").await.unwrap();
        a.send(b"three").await.unwrap();

        assert_eq!(b.recv().await.unwrap().as_ref(), b"one");
        assert_eq!(b.recv().await.unwrap().as_ref(), b"");
        assert_eq!(b.recv().await.unwrap().as_ref(), b"three");
    }

    #[tokio::test]
    async fn test_stream_stats() {
        let (a, b) = pair(StreamConfig::default());

        a.send(b"Test message").await.unwrap();
        b.recv().await.unwrap();

        let sent = a.stats().unwrap();
        assert_eq!(sent.messages_sent, 1);
        assert_eq!(sent.bytes_sent, 12 + 4);

        let received = b.stats().unwrap();
        assert_eq!(received.messages_received, 1);
        assert_eq!(received.bytes_received, 12 + 4);
    }

    #[tokio::test]
    async fn test_stream_message_too_large() {
        let (a, _b) = pair(StreamConfig::default().with_max_message_size(1024));

        let result = a.send(&vec![0; 2048]).await;
        assert!(matches!(
            result,
            Err(TransportError::MessageTooLarge {
                size: 2048,
                max: 1024
            })
        ));
    }

    #[tokio::test]
    async fn test_send_after_close_is_rejected() {
        let (a, _b) = pair(StreamConfig::default());

        a.close().await.unwrap();
        a.close().await.unwrap();
        assert!(matches!(
            a.send(b"late").await,
            Err(TransportError::NotConnected)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_peer_does_not_fail_recv() {
        let (a, b) = pair(StreamConfig::default());

        let pending = tokio::spawn(async move {
            let received = b.recv().await;
            (b, received)
        });
        tokio::time::sleep(Duration::from_secs(3600)).await;
        a.send(b"much later").await.unwrap();

        let (b, received) = pending.await.unwrap();
        assert_eq!(received.unwrap().as_ref(), b"much later");
        assert!(b.is_connected());
    }

    #[tokio::test]
    async fn test_peer_close_is_eof() {
        let (a, b) = pair(StreamConfig::default());

        a.close().await.unwrap();
        assert!(matches!(
            b.recv().await,
            Err(TransportError::ReceiveFailed { .. })
        ));
        assert!(!b.is_connected());
    }
}
