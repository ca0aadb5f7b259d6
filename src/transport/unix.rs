use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};

use crate::error::{TransportError, TransportResult};
use crate::transport::stream::{StreamConfig, StreamTransport};

/// Length-prefixed transport over a Unix domain socket.
pub type UnixTransport = StreamTransport<OwnedReadHalf, OwnedWriteHalf>;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

impl UnixTransport {
    /// Connect to a Unix socket at the given path.
    pub async fn connect(path: impl AsRef<Path>, config: StreamConfig) -> TransportResult<Self> {
        let path = path.as_ref().to_path_buf();
        let stream = tokio::time::timeout(DEFAULT_CONNECT_TIMEOUT, UnixStream::connect(&path))
            .await
            .map_err(|_| TransportError::Timeout {
                duration_ms: DEFAULT_CONNECT_TIMEOUT.as_millis() as u64,
                operation: format!("connecting to {:?}", path),
            })?
            .map_err(|e| unavailable(&path, e.to_string()))?;

        Ok(Self::from_stream(stream, path.display().to_string(), config))
    }

    /// Wrap an already connected stream, e.g. one end of `UnixStream::pair()`.
    pub fn from_stream(stream: UnixStream, name: impl Into<String>, config: StreamConfig) -> Self {
        let (reader, writer) = stream.into_split();
        StreamTransport::new(reader, writer, name, config)
    }
}

/// Accepts emitter connections on a socket path. The socket file is removed
/// when the listener is dropped.
pub struct UnixTransportListener {
    listener: UnixListener,
    config: StreamConfig,
    path: PathBuf,
}

impl UnixTransportListener {
    /// Bind `path`, replacing a stale socket file left by a dead process.
    ///
    /// Fails if another process is still accepting on `path`.
    pub async fn bind(path: impl AsRef<Path>, config: StreamConfig) -> TransportResult<Self> {
        let path = path.as_ref().to_path_buf();

        if path.exists() {
            if UnixStream::connect(&path).await.is_ok() {
                return Err(unavailable(&path, "socket is in use".into()));
            }
            std::fs::remove_file(&path)
                .map_err(|e| unavailable(&path, format!("cannot remove stale socket: {e}")))?;
        }

        let listener =
            UnixListener::bind(&path).map_err(|e| unavailable(&path, format!("bind: {e}")))?;
        tracing::debug!(path = %path.display(), "listening");

        Ok(Self {
            listener,
            config,
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn accept(&self) -> TransportResult<UnixTransport> {
        let (stream, _) = self
            .listener
            .accept()
            .await
            .map_err(|e| unavailable(&self.path, format!("accept: {e}")))?;

        Ok(UnixTransport::from_stream(
            stream,
            self.path.display().to_string(),
            self.config.clone(),
        ))
    }
}

impl Drop for UnixTransportListener {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn unavailable(path: &Path, reason: String) -> TransportError {
    TransportError::ConnectionFailed {
        name: path.display().to_string(),
        attempts: 1,
        reason,
    }
}
