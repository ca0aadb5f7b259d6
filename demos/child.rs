//! Child half of the parent/child demo. Spawned by `parent`; talks over stdio.
//!
//! stdout carries the framed envelopes, so all logging goes to stderr.

use ipc_event_emitter::{EmitterConfig, IpcEventEmitter, PendingSend, StreamConfig, stdio};
use serde_json::json;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = EmitterConfig::from_env()?.with_name("child");
    let emitter = IpcEventEmitter::with_config(stdio(StreamConfig::default()), config)?;

    // the parent may ask for "ready" again in any of the three forms
    emitter
        .on("emit-ready", |emitter, args| {
            report("emit", emitter.emit("ready", args.to_vec()));
        })
        .on("pin-ready", |emitter, args| {
            report("pin", emitter.pin("ready", args.to_vec()));
        })
        .on("unpin-ready", |emitter, _| {
            report("unpin", emitter.unpin("ready"));
        });

    // pretend to do some startup work before announcing readiness
    tokio::time::sleep(Duration::from_millis(100)).await;
    emitter
        .pin("ready", vec![json!("child"), json!(std::process::id())])?
        .await?;
    tracing::info!("pinned \"ready\"");

    while emitter.is_connected() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    tracing::info!("parent went away, exiting");

    Ok(())
}

fn report(what: &'static str, sent: ipc_event_emitter::Result<PendingSend>) {
    match sent {
        Ok(pending) => {
            tokio::spawn(async move {
                if let Err(e) = pending.await {
                    tracing::warn!(error = %e, "{} \"ready\" failed", what);
                }
            });
        }
        Err(e) => tracing::warn!(error = %e, "{} \"ready\" rejected", what),
    }
}
