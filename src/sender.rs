//! Outbound half: a FIFO queue drained by one writer task.
//!
//! `emit`/`pin`/`unpin` enqueue synchronously, so the order of calls is the
//! order on the wire. Each queued envelope carries a oneshot that the writer
//! completes once the transport acknowledges the send. [`PendingSend`] waits
//! on that oneshot, bounded by the instance timeout if one is configured.

use futures::FutureExt;
use futures::future::BoxFuture;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::codec::Codec;
use crate::envelope::Envelope;
use crate::error::{EmitterError, Result, SendPrimitive};
use crate::logging::WireLog;
use crate::transport::Transport;

pub(crate) struct Outbound {
    envelope: Envelope,
    ack: oneshot::Sender<Result<()>>,
}

/// Completion of one emit/pin/unpin.
///
/// Resolves to `Ok(())` once the transport acknowledges the envelope.
/// Dropping it does not cancel the send.
#[must_use = "the send is queued either way; await to observe acknowledgement or failure"]
pub struct PendingSend {
    inner: BoxFuture<'static, Result<()>>,
}

impl PendingSend {
    fn new(
        ack: oneshot::Receiver<Result<()>>,
        timeout: Option<Duration>,
        primitive: SendPrimitive,
    ) -> Self {
        // the deadline runs from the moment the send is issued, not first poll;
        // a bound too large to represent as an instant never expires
        let deadline = timeout.and_then(|bound| {
            Instant::now()
                .checked_add(bound)
                .map(|deadline| (deadline, bound))
        });

        let inner = async move {
            let acked = match deadline {
                Some((deadline, bound)) => tokio::time::timeout_at(deadline, ack)
                    .await
                    .map_err(|_| EmitterError::Timeout { bound, primitive })?,
                None => ack.await,
            };
            acked.map_err(|_| EmitterError::Closed)?
        }
        .boxed();

        Self { inner }
    }
}

impl Future for PendingSend {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.as_mut().poll(cx)
    }
}

impl std::fmt::Debug for PendingSend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingSend").finish_non_exhaustive()
    }
}

/// Issues envelopes onto the writer queue.
#[derive(Debug)]
pub(crate) struct Sender {
    queue: mpsc::UnboundedSender<Outbound>,
    timeout: Option<Duration>,
    primitive: SendPrimitive,
}

impl Sender {
    pub(crate) fn new(
        timeout: Option<Duration>,
        primitive: SendPrimitive,
    ) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (queue, rx) = mpsc::unbounded_channel();
        (
            Self {
                queue,
                timeout,
                primitive,
            },
            rx,
        )
    }

    pub(crate) fn send(&self, envelope: Envelope) -> PendingSend {
        let (ack, rx) = oneshot::channel();
        // a stopped writer drops the returned Outbound and its ack, which
        // resolves the PendingSend as Closed
        let _ = self.queue.send(Outbound { envelope, ack });
        PendingSend::new(rx, self.timeout, self.primitive)
    }
}

impl std::fmt::Debug for Outbound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outbound")
            .field("envelope", &self.envelope)
            .finish()
    }
}

/// Drain the queue onto the transport, one envelope at a time.
pub(crate) async fn write_loop<T: Transport, C: Codec>(
    transport: Arc<T>,
    codec: C,
    mut queue: mpsc::UnboundedReceiver<Outbound>,
    shutdown: CancellationToken,
    wire: WireLog,
) {
    loop {
        let outbound = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            next = queue.recv() => match next {
                Some(outbound) => outbound,
                None => break,
            },
        };

        wire.outbound(&outbound.envelope);

        let result = match outbound.envelope.encode(&codec) {
            Ok(bytes) => tokio::select! {
                biased;
                _ = shutdown.cancelled() => Err(EmitterError::Closed),
                sent = transport.send(&bytes) => sent.map_err(EmitterError::from),
            },
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            tracing::warn!(
                instance = wire.name(),
                kind = outbound.envelope.kind(),
                event = outbound.envelope.name(),
                error = %e,
                "send failed"
            );
        }

        // the receiver is gone if the send already timed out
        let _ = outbound.ack.send(result);
    }

    tracing::debug!(instance = wire.name(), "writer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;
    use crate::config::EmitterConfig;
    use crate::transport::memory::{MemoryConfig, MemoryTransport};

    fn emit(name: &str) -> Envelope {
        Envelope::Emit {
            name: name.into(),
            args: vec![],
        }
    }

    #[tokio::test]
    async fn test_sends_are_acknowledged_in_order() {
        let (local, remote) =
            MemoryTransport::create_pair("writer", MemoryConfig::default()).unwrap();
        let (sender, queue) = Sender::new(None, SendPrimitive::Send);
        let shutdown = CancellationToken::new();
        tokio::spawn(write_loop(
            Arc::new(local),
            JsonCodec,
            queue,
            shutdown.clone(),
            WireLog::new(&EmitterConfig::default()),
        ));

        let pending: Vec<PendingSend> = (0..5)
            .map(|i| sender.send(emit(&format!("e{i}"))))
            .collect();
        for p in pending {
            p.await.unwrap();
        }

        for i in 0..5 {
            let bytes = remote.recv().await.unwrap();
            assert_eq!(
                Envelope::decode(&JsonCodec, &bytes),
                Some(emit(&format!("e{i}")))
            );
        }
        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_stopped_writer_resolves_closed() {
        let (sender, queue) = Sender::new(None, SendPrimitive::Send);
        drop(queue);

        assert!(matches!(
            sender.send(emit("late")).await,
            Err(EmitterError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_unrepresentable_deadline_waits_for_ack() {
        let (local, remote) =
            MemoryTransport::create_pair("forever", MemoryConfig::default()).unwrap();
        let (sender, queue) = Sender::new(Some(Duration::MAX), SendPrimitive::Send);
        let shutdown = CancellationToken::new();
        tokio::spawn(write_loop(
            Arc::new(local),
            JsonCodec,
            queue,
            shutdown.clone(),
            WireLog::new(&EmitterConfig::default()),
        ));

        sender.send(emit("patient")).await.unwrap();
        assert_eq!(
            Envelope::decode(&JsonCodec, &remote.recv().await.unwrap()),
            Some(emit("patient"))
        );
        shutdown.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_starts_at_issue() {
        let (sender, _queue) = Sender::new(Some(Duration::from_millis(10)), SendPrimitive::Deliver);

        let started = Instant::now();
        let pending = sender.send(emit("slow"));
        tokio::time::sleep(Duration::from_millis(7)).await;

        let err = pending.await.unwrap_err();
        assert!(matches!(
            err,
            EmitterError::Timeout {
                primitive: SendPrimitive::Deliver,
                ..
            }
        ));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(10), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(20), "{elapsed:?}");
    }
}
