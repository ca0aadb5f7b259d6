//! Parent half of the parent/child demo.
//!
//! Build both demos first (`cargo build --examples`), then run
//! `cargo run --example parent`. Set `IPC_EVENT_EMITTER_DEBUG=1` and
//! `RUST_LOG=info` to see every envelope on both sides.

use ipc_event_emitter::{EmitterConfig, IpcEventEmitter, StreamConfig, from_child};
use serde_json::{Value, json};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let child_path = std::env::current_exe()?.with_file_name("child");
    let mut child = Command::new(&child_path)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let transport = from_child(&mut child, StreamConfig::default())?;
    let config = EmitterConfig::from_env()?.with_name("parent");
    let emitter = IpcEventEmitter::with_config(transport, config)?;

    // the child pins "ready" long before we start listening
    tokio::time::sleep(Duration::from_millis(500)).await;

    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<Value>>();
    emitter.on("ready", move |_, args| {
        let _ = tx.send(args.to_vec());
    });

    let first = rx.recv().await.ok_or("listener dropped")?;
    println!("[Parent] ready (replayed from pin): {:?}", first);

    emitter.emit("unpin-ready", vec![])?.await?;
    emitter.emit("emit-ready", vec![json!("live")])?.await?;
    let live = rx.recv().await.ok_or("listener dropped")?;
    println!("[Parent] ready (live emit): {:?}", live);
    println!("[Parent] still pinned locally: {}", emitter.is_pinned("ready"));

    emitter.once("ready", |_, args| {
        println!("[Parent] once listener saw: {:?}", args);
    });
    emitter.emit("pin-ready", vec![json!("again")])?.await?;
    let pinned = rx.recv().await.ok_or("listener dropped")?;
    println!("[Parent] ready (pinned again): {:?}", pinned);

    emitter.disconnect().await?;
    let status = child.wait().await?;
    println!("[Parent] child exited with {}", status);

    Ok(())
}
