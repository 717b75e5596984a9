//! Watch a project's workflow state in real time.
//!
//! Polls the snapshot adaptively (0.5 s while a step runs, 10 s idle) and
//! folds WebSocket events into a live log, printing both as they arrive.
//!
//! ```sh
//! cargo run --example watch_workflow
//! ```

use std::time::Duration;

use tokio::sync::mpsc;
use workflow_sync::{SyncConfig, SyncUpdate, Synchronizer, WorkflowClient};

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let client = WorkflowClient::new("http://127.0.0.1:8000/api/v2");
    let sync = Synchronizer::new(client, SyncConfig::default());

    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = sync.spawn("demo-project", move |update| {
        let _ = tx.send(update);
    });

    let deadline = tokio::time::Instant::now() + Duration::from_secs(120);
    loop {
        let update = tokio::select! {
            update = rx.recv() => match update {
                Some(u) => u,
                None => break,
            },
            _ = tokio::time::sleep_until(deadline) => break,
        };

        match update {
            SyncUpdate::Snapshot(snapshot) => {
                println!(
                    "overall: {} ({:.0}%)",
                    snapshot.overall_status.as_str(),
                    snapshot.overall_progress
                );
                for (id, step) in snapshot.steps() {
                    let lock = id
                        .lock_reason(&step.dependencies)
                        .map(|reason| format!(" \u{2014} {reason}"))
                        .unwrap_or_default();
                    println!(
                        "  {}: {} ({:.0}%){}",
                        id.display_name(),
                        step.status.as_str(),
                        step.overall_progress,
                        lock
                    );
                }
                if snapshot.overall_status.is_terminal() {
                    break;
                }
            }
            SyncUpdate::Log(entry) => {
                println!("[{}] {}", entry.level.as_str(), entry.message);
            }
            SyncUpdate::Phase(phase) => println!("session phase: {phase:?}"),
            SyncUpdate::FetchFailed(message) => {
                eprintln!("fetch failed (keeping last known state): {message}");
            }
        }
    }

    handle.stop().await;
    Ok(())
}
