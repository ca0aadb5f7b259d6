//! Transports linking a parent process and a child over the child's stdio.
//!
//! The parent spawns the child with piped stdin/stdout and wraps them with
//! [`from_child`]; the child wraps its own stdin/stdout with [`stdio`]. Both
//! ends use the length-prefixed framing of [`StreamTransport`], so the child
//! must keep its stdout free of anything else (log to stderr instead).

use tokio::io::{Stdin, Stdout};
use tokio::process::{Child, ChildStdin, ChildStdout};

use crate::error::{TransportError, TransportResult};
use crate::transport::stream::{StreamConfig, StreamTransport};

/// Parent side: reads the child's stdout, writes the child's stdin.
pub type ChildTransport = StreamTransport<ChildStdout, ChildStdin>;

/// Child side: reads this process's stdin, writes this process's stdout.
pub type StdioTransport = StreamTransport<Stdin, Stdout>;

/// Take the piped stdin/stdout of a spawned child.
///
/// Fails if the child was not spawned with `Stdio::piped()` for both, or if
/// they were already taken.
pub fn from_child(child: &mut Child, config: StreamConfig) -> TransportResult<ChildTransport> {
    let name = match child.id() {
        Some(pid) => format!("child-{}", pid),
        None => "child".to_string(),
    };

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| not_piped(&name, "stdin"))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| not_piped(&name, "stdout"))?;

    Ok(StreamTransport::new(stdout, stdin, name, config))
}

/// Wrap this process's stdin/stdout for talking to the parent.
pub fn stdio(config: StreamConfig) -> StdioTransport {
    StreamTransport::new(
        tokio::io::stdin(),
        tokio::io::stdout(),
        format!("parent-of-{}", std::process::id()),
        config,
    )
}

fn not_piped(name: &str, stream: &str) -> TransportError {
    TransportError::ConnectionFailed {
        name: name.to_string(),
        attempts: 1,
        reason: format!("{} is not piped", stream),
    }
}
