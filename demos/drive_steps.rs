//! Start a workflow step, watch it briefly, then stop it.
//!
//! Exercises the command surface: dependency gating is checked client-side
//! for a friendlier message, but the backend stays authoritative, and a
//! rejected start surfaces as an HTTP error either way.
//!
//! ```sh
//! cargo run --example drive_steps
//! ```

use std::time::Duration;

use workflow_sync::{StepId, SyncConfig, SyncUpdate, Synchronizer, WorkflowClient};

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let client = WorkflowClient::new("http://127.0.0.1:8000/api/v2");

    let snapshot = client.fetch_snapshot("demo-project").await?;
    let step = StepId::ScriptAnalysis;
    let state = snapshot.step(step);
    if let Some(reason) = step.lock_reason(&state.dependencies) {
        eprintln!("{} is locked: {reason}", step.display_name());
        return Ok(());
    }

    let sync = Synchronizer::new(client, SyncConfig::builder().without_events().build());
    let handle = sync.spawn("demo-project", |update| {
        if let SyncUpdate::Log(entry) = update {
            println!("[{}] {}", entry.level.as_str(), entry.message);
        }
    });

    let ack = handle.start_step(step).await?;
    println!("backend: {}", ack.message);

    tokio::time::sleep(Duration::from_secs(10)).await;

    let ack = handle.stop_step(step).await?;
    println!("backend: {}", ack.message);

    handle.stop().await;
    Ok(())
}
