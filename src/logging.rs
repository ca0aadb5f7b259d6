use std::sync::Arc;

use crate::config::EmitterConfig;
use crate::envelope::Envelope;

/// Per-instance envelope logger, enabled by `EmitterConfig::debug`.
#[derive(Clone, Debug)]
pub(crate) struct WireLog {
    name: Arc<str>,
    enabled: bool,
}

impl WireLog {
    pub(crate) fn new(config: &EmitterConfig) -> Self {
        Self {
            name: Arc::from(config.name.as_str()),
            enabled: config.debug,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn inbound(&self, envelope: &Envelope) {
        if self.enabled {
            tracing::info!(
                target: "ipc_event_emitter::wire",
                instance = %self.name,
                direction = "in",
                kind = envelope.kind(),
                event = envelope.name(),
                ?envelope,
                "envelope"
            );
        }
    }

    pub(crate) fn outbound(&self, envelope: &Envelope) {
        if self.enabled {
            tracing::info!(
                target: "ipc_event_emitter::wire",
                instance = %self.name,
                direction = "out",
                kind = envelope.kind(),
                event = envelope.name(),
                ?envelope,
                "envelope"
            );
        }
    }
}
