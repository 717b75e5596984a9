use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::client::WorkflowClient;
use crate::config::SyncConfig;
use crate::error::Result;
use crate::events::{parse_event, LogEntry, LogLevel};
use crate::session::{FetchOutcome, SessionPhase, SyncSession};
use crate::types::{EpisodeAck, ProgressAck, StepAck, StepId, WorkflowSnapshot};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Change notifications emitted by a running synchronizer.
#[derive(Debug, Clone)]
pub enum SyncUpdate {
    /// A fresh snapshot was applied to the session cache.
    Snapshot(WorkflowSnapshot),
    /// An entry was appended to the session log.
    Log(LogEntry),
    /// The session moved to a new lifecycle phase.
    Phase(SessionPhase),
    /// A snapshot fetch failed; the last-known-good snapshot is retained
    /// and polling continues.
    FetchFailed(String),
}

enum ControlMsg {
    CommandCompleted {
        summary: String,
        step_id: Option<String>,
    },
    Stop,
}

/// Drives one project's workflow view: adaptive snapshot polling, the
/// WebSocket event feed, and refetch-after-command consistency.
///
/// Each [`Synchronizer::spawn`] call runs a single background task owning
/// a [`SyncSession`]; at most one snapshot fetch is in flight at any time,
/// and refetch triggers arriving mid-fetch coalesce into one rerun.
///
/// # Example
/// ```no_run
/// use workflow_sync::{StepId, SyncConfig, SyncUpdate, Synchronizer, WorkflowClient};
///
/// # async fn example() -> workflow_sync::Result<()> {
/// let client = WorkflowClient::new("http://127.0.0.1:8000/api/v2");
/// let sync = Synchronizer::new(client, SyncConfig::default());
///
/// let handle = sync.spawn("my-project", |update| {
///     if let SyncUpdate::Snapshot(snapshot) = update {
///         println!("overall progress: {:.0}%", snapshot.overall_progress);
///     }
/// });
///
/// handle.start_step(StepId::ScriptAnalysis).await?;
/// // ... later
/// handle.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct Synchronizer {
    client: WorkflowClient,
    config: SyncConfig,
}

impl Synchronizer {
    pub fn new(client: WorkflowClient, config: SyncConfig) -> Self {
        Self { client, config }
    }

    /// Start synchronizing one project. The returned handle issues step
    /// commands and stops the session.
    pub fn spawn<F>(&self, project_id: impl Into<String>, on_update: F) -> SyncHandle
    where
        F: FnMut(SyncUpdate) + Send + 'static,
    {
        let project_id = project_id.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_loop(
            self.client.clone(),
            self.config.clone(),
            project_id.clone(),
            rx,
            on_update,
        ));
        SyncHandle {
            client: self.client.clone(),
            project_id,
            tx,
            task,
        }
    }
}

/// Handle to a running synchronizer session.
///
/// Commands follow fire-and-refetch semantics: on success the session
/// appends an info-level log entry and schedules exactly one coalesced
/// snapshot refetch; on failure the error is returned to the caller and
/// no cached state changes. Client-side gating (e.g. not starting a
/// locked step) is advisory: the backend's rejection arrives as an
/// ordinary [`crate::SyncError::Http`] and must be handled either way.
pub struct SyncHandle {
    client: WorkflowClient,
    project_id: String,
    tx: mpsc::UnboundedSender<ControlMsg>,
    task: tokio::task::JoinHandle<()>,
}

impl SyncHandle {
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Stop the session: the loop halts polling, closes the event stream,
    /// and discards any in-flight fetch.
    pub async fn stop(self) {
        let _ = self.tx.send(ControlMsg::Stop);
        let _ = self.task.await;
    }

    // A send failure means the loop has already torn down; the command
    // response is then ignored rather than applied to dead state.
    fn notify_command(&self, summary: String, step_id: Option<String>) {
        let _ = self.tx.send(ControlMsg::CommandCompleted { summary, step_id });
    }

    /// Start a workflow step.
    pub async fn start_step(&self, step: StepId) -> Result<StepAck> {
        let ack = self.client.start_step(&self.project_id, step).await?;
        self.notify_command(
            format!("Started {}", step.display_name()),
            Some(step.as_str().to_string()),
        );
        Ok(ack)
    }

    /// Stop a running workflow step.
    pub async fn stop_step(&self, step: StepId) -> Result<StepAck> {
        let ack = self.client.stop_step(&self.project_id, step).await?;
        self.notify_command(
            format!("Stopped {}", step.display_name()),
            Some(step.as_str().to_string()),
        );
        Ok(ack)
    }

    /// Cancel a step, recording the reason as its failure message.
    pub async fn cancel_step(&self, step: StepId, reason: &str) -> Result<StepAck> {
        let ack = self.client.fail_step(&self.project_id, step, reason).await?;
        self.notify_command(
            format!("Cancelled {}: {reason}", step.display_name()),
            Some(step.as_str().to_string()),
        );
        Ok(ack)
    }

    /// Mark a step completed.
    pub async fn complete_step(
        &self,
        step: StepId,
        quality_score: Option<u32>,
        result_path: Option<&str>,
    ) -> Result<StepAck> {
        let ack = self
            .client
            .complete_step(&self.project_id, step, quality_score, result_path)
            .await?;
        self.notify_command(
            format!("Marked {} completed", step.display_name()),
            Some(step.as_str().to_string()),
        );
        Ok(ack)
    }

    /// Report step progress on behalf of a worker.
    pub async fn update_progress(
        &self,
        step: StepId,
        progress: f64,
        current_task: Option<&str>,
    ) -> Result<ProgressAck> {
        let ack = self
            .client
            .update_progress(&self.project_id, step, progress, current_task)
            .await?;
        self.notify_command(
            format!("{} progress set to {progress:.0}%", step.display_name()),
            Some(step.as_str().to_string()),
        );
        Ok(ack)
    }

    /// Start processing a single episode within script analysis.
    pub async fn start_episode(&self, episode_id: &str) -> Result<EpisodeAck> {
        let ack = self.client.start_episode(&self.project_id, episode_id).await?;
        self.notify_command(
            format!("Started processing episode: {episode_id}"),
            Some(StepId::ScriptAnalysis.as_str().to_string()),
        );
        Ok(ack)
    }

    /// Stop processing a single episode within script analysis.
    pub async fn stop_episode(&self, episode_id: &str) -> Result<EpisodeAck> {
        let ack = self.client.stop_episode(&self.project_id, episode_id).await?;
        self.notify_command(
            format!("Stopped episode: {episode_id}"),
            Some(StepId::ScriptAnalysis.as_str().to_string()),
        );
        Ok(ack)
    }
}

/// Yield the next frame from the event stream, or park forever when no
/// stream is connected (polling remains the only source then).
async fn next_frame(
    ws: &mut Option<WsStream>,
) -> Option<std::result::Result<Message, tokio_tungstenite::tungstenite::Error>> {
    match ws {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

async fn run_loop<F>(
    client: WorkflowClient,
    config: SyncConfig,
    project_id: String,
    mut rx: mpsc::UnboundedReceiver<ControlMsg>,
    mut on_update: F,
) where
    F: FnMut(SyncUpdate) + Send + 'static,
{
    let mut session = SyncSession::new(&project_id);
    session.start();
    on_update(SyncUpdate::Phase(session.phase()));

    // One event-stream connection per project. Connect failure degrades
    // to poll-only; no auto-reconnect.
    let mut ws: Option<WsStream> = if config.connect_events {
        match tokio_tungstenite::connect_async(client.ws_url(&project_id)).await {
            Ok((stream, _)) => {
                let entry =
                    session.push_log(LogLevel::Info, "Connected to workflow server", None);
                on_update(SyncUpdate::Log(entry));
                Some(stream)
            }
            Err(e) => {
                eprintln!("[workflow-sync] WebSocket connect failed: {e}, continuing poll-only");
                let entry =
                    session.push_log(LogLevel::Error, "Workflow event stream error", None);
                on_update(SyncUpdate::Log(entry));
                None
            }
        }
    } else {
        None
    };

    // The first snapshot is due immediately.
    session.request_refetch();

    loop {
        // Serve any due fetch before sleeping. Triggers set while the
        // fetch was awaited run on the next pass of this loop, so bursts
        // collapse into sequential fetches, never concurrent ones.
        while session.take_refetch_request() {
            let Some(ticket) = session.begin_fetch() else {
                break;
            };
            let phase_before = session.phase();
            let result = client.fetch_snapshot(&project_id).await;
            match session.complete_fetch(ticket, result) {
                FetchOutcome::Applied => {
                    if let Some(snapshot) = session.snapshot() {
                        on_update(SyncUpdate::Snapshot(snapshot.clone()));
                    }
                }
                FetchOutcome::Failed(message) => on_update(SyncUpdate::FetchFailed(message)),
                FetchOutcome::Discarded => {}
            }
            if session.phase() != phase_before {
                on_update(SyncUpdate::Phase(session.phase()));
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(session.poll_delay(&config)) => {
                session.request_refetch();
            }
            msg = rx.recv() => match msg {
                Some(ControlMsg::CommandCompleted { summary, step_id }) => {
                    let entry = session.command_completed(summary, step_id);
                    on_update(SyncUpdate::Log(entry));
                }
                // Channel closed counts as stop: the handle is gone
                Some(ControlMsg::Stop) | None => break,
            },
            frame = next_frame(&mut ws) => match frame {
                Some(Ok(msg)) if msg.is_text() => {
                    let text = msg.into_text().unwrap_or_default();
                    match parse_event(&text) {
                        Ok(event) => {
                            let entry = session.apply_event(&event);
                            on_update(SyncUpdate::Log(entry));
                        }
                        Err(e) => {
                            eprintln!("[workflow-sync] Dropping malformed event frame: {e}");
                        }
                    }
                }
                // Binary/ping/pong frames carry no workflow events
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    eprintln!("[workflow-sync] WebSocket error: {e}");
                    let entry =
                        session.push_log(LogLevel::Error, "Workflow event stream error", None);
                    on_update(SyncUpdate::Log(entry));
                }
                None => {
                    let entry = session.push_log(
                        LogLevel::Warning,
                        "Disconnected from workflow server",
                        None,
                    );
                    on_update(SyncUpdate::Log(entry));
                    ws = None;
                }
            },
        }
    }

    session.begin_teardown();
    on_update(SyncUpdate::Phase(session.phase()));
    if let Some(mut stream) = ws.take() {
        let _ = stream.close(None).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synchronizer_construction() {
        let client = WorkflowClient::new("http://localhost:8000/api/v2");
        let sync = Synchronizer::new(client, SyncConfig::default());
        assert!(sync.config.connect_events);
    }

    #[tokio::test]
    async fn test_spawn_and_stop_without_backend() {
        // Poll-only against a dead endpoint: the loop must keep running
        // on fetch failures and stop cleanly on request.
        let client = WorkflowClient::new("http://127.0.0.1:1/api/v2");
        let config = SyncConfig::builder().without_events().build();
        let sync = Synchronizer::new(client, config);

        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        let handle = sync.spawn("p1", move |update| {
            let _ = seen_tx.send(update);
        });

        // First update is always the Connecting phase
        let first = seen_rx.recv().await;
        assert!(matches!(first, Some(SyncUpdate::Phase(SessionPhase::Connecting))));

        handle.stop().await;

        // The loop reported teardown before exiting
        let mut saw_teardown = false;
        while let Ok(update) = seen_rx.try_recv() {
            if matches!(update, SyncUpdate::Phase(SessionPhase::TearingDown)) {
                saw_teardown = true;
            }
        }
        assert!(saw_teardown);
    }

    #[tokio::test]
    async fn test_commands_after_stop_are_ignored() {
        let client = WorkflowClient::new("http://127.0.0.1:1/api/v2");
        let config = SyncConfig::builder().without_events().build();
        let sync = Synchronizer::new(client, config);

        let handle = sync.spawn("p1", |_| {});
        let tx = handle.tx.clone();
        handle.stop().await;

        // The loop is gone; a late command notification goes nowhere
        assert!(tx
            .send(ControlMsg::CommandCompleted {
                summary: "late".into(),
                step_id: None,
            })
            .is_err());
    }
}
