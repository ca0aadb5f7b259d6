use std::time::Duration;

use crate::error::{EmitterError, Result};

/// Environment variable enabling wire logging of every envelope.
pub const DEBUG_ENV: &str = "IPC_EVENT_EMITTER_DEBUG";

/// Environment variable holding the send timeout in milliseconds.
pub const TIMEOUT_ENV: &str = "IPC_EVENT_EMITTER_TIMEOUT";

/// Configuration for an [`IpcEventEmitter`](crate::IpcEventEmitter).
#[derive(Clone, Debug)]
pub struct EmitterConfig {
    /// Bound on acknowledgement latency for emit/pin/unpin. `None` waits forever.
    pub timeout: Option<Duration>,
    /// Instance name used in log output.
    pub name: String,
    /// Log every inbound and outbound envelope at `info`.
    pub debug: bool,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            name: std::process::id().to_string(),
            debug: false,
        }
    }
}

impl EmitterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `IPC_EVENT_EMITTER_DEBUG` and
    /// `IPC_EVENT_EMITTER_TIMEOUT`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(debug) = lookup(DEBUG_ENV) {
            config.debug = parse_bool(&debug);
        }

        if let Some(timeout) = lookup(TIMEOUT_ENV) {
            let ms: f64 = timeout.trim().parse().map_err(|_| {
                EmitterError::InvalidArgument(format!(
                    "Invalid timeout; expected number > 0, got: {timeout}"
                ))
            })?;
            config = config.with_timeout_ms(ms)?;
        }

        Ok(config)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the timeout from a millisecond count, which must be a positive
    /// finite number. Sub-nanosecond values round up to one nanosecond.
    pub fn with_timeout_ms(mut self, ms: f64) -> Result<Self> {
        if !ms.is_finite() || ms <= 0.0 {
            return Err(EmitterError::InvalidArgument(format!(
                "Invalid timeout; expected number > 0, got: {ms}"
            )));
        }
        let nanos = ((ms * 1_000_000.0).round() as u64).max(1);
        self.timeout = Some(Duration::from_nanos(nanos));
        Ok(self)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(timeout) = self.timeout.filter(Duration::is_zero) {
            return Err(EmitterError::InvalidArgument(format!(
                "Invalid timeout; expected number > 0, got: {timeout:?}"
            )));
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on" | "y"
    )
}
