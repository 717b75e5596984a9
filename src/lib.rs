//! # workflow-sync
//!
//! Async client for analyst pipeline backends: the multi-step content
//! pipelines (import, script analysis, novel analysis, alignment) exposed
//! over a project-scoped REST API and a per-project WebSocket event feed.
//!
//! The crate keeps a local view of one project's workflow state coherent
//! by reconciling three inputs: adaptively polled snapshots (0.5 s while a
//! step runs, 10 s otherwise), pushed workflow events folded into an
//! append-only session log, and user-issued step commands followed by a
//! forced refetch. Snapshot fetches are single-flight; stale responses for
//! an abandoned session are discarded, and a dropped event stream degrades
//! to poll-only operation.
//!
//! ## Quick Start
//!
//! ```no_run
//! use workflow_sync::{StepId, SyncConfig, SyncUpdate, Synchronizer, WorkflowClient};
//!
//! # async fn example() -> workflow_sync::Result<()> {
//! let client = WorkflowClient::new("http://127.0.0.1:8000/api/v2");
//! let sync = Synchronizer::new(client, SyncConfig::default());
//!
//! // Watch one project; updates arrive as snapshots and log entries
//! let handle = sync.spawn("my-project", |update| match update {
//!     SyncUpdate::Snapshot(snapshot) => {
//!         for (id, step) in snapshot.steps() {
//!             println!("{}: {}", id.display_name(), step.status.as_str());
//!         }
//!     }
//!     SyncUpdate::Log(entry) => println!("[{}] {}", entry.level.as_str(), entry.message),
//!     _ => {}
//! });
//!
//! // Commands refetch the snapshot on success instead of guessing state
//! handle.start_step(StepId::ScriptAnalysis).await?;
//! // ... later
//! handle.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod session;
pub mod sync;
pub mod types;

pub use client::WorkflowClient;
pub use config::{SyncConfig, SyncConfigBuilder};
pub use error::{Result, SyncError};
pub use events::{parse_event, LlmDetail, LogEntry, LogLevel, WorkflowEvent};
pub use session::{FetchOutcome, FetchTicket, SessionLog, SessionPhase, SyncSession};
pub use sync::{SyncHandle, SyncUpdate, Synchronizer};
pub use types::{
    DependencyCheck, EpisodeAck, EpisodeState, ProgressAck, StepAck, StepId, StepState,
    StepStatus, WorkflowSnapshot,
};
