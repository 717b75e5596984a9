use std::time::Duration;

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::events::{LogEntry, LogLevel, WorkflowEvent};
use crate::types::WorkflowSnapshot;

/// Lifecycle phase of a synchronizer session.
///
/// `Connecting` spans from start until the first snapshot fetch resolves
/// (success or failure), so consumers can render a loading affordance
/// instead of treating placeholder data as authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Connecting,
    Active,
    TearingDown,
}

/// Ticket identifying one outstanding snapshot fetch.
///
/// A completed fetch is only applied when its ticket still matches the
/// session; responses from an abandoned project or a superseded fetch are
/// discarded unconditionally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    project_id: String,
    seq: u64,
}

/// How a completed fetch was folded into the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The snapshot was applied to the cache.
    Applied,
    /// The fetch failed; the last-known-good snapshot is retained.
    Failed(String),
    /// The response no longer matches this session and was dropped.
    Discarded,
}

/// Append-only log accumulated for the lifetime of one session.
///
/// Entries are never mutated after creation; ordering is receipt order,
/// not timestamp order. Growth is unbounded within a session; retention
/// is the consumer's concern.
#[derive(Debug, Default)]
pub struct SessionLog {
    entries: Vec<LogEntry>,
}

impl SessionLog {
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn append(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }
}

/// Per-project synchronization state: snapshot cache, session log, and
/// fetch bookkeeping.
///
/// One session is owned exclusively by one synchronizer run for one
/// project id; it is constructed at session start and discarded at
/// teardown. All mutation happens on the owning task, so single-flight
/// fetching and receipt-order event folding are structural properties.
#[derive(Debug)]
pub struct SyncSession {
    project_id: String,
    phase: SessionPhase,
    snapshot: Option<WorkflowSnapshot>,
    log: SessionLog,
    last_error: Option<String>,
    last_fetch_ok: bool,
    in_flight: Option<u64>,
    next_seq: u64,
    refetch_requested: bool,
}

impl SyncSession {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            phase: SessionPhase::Idle,
            snapshot: None,
            log: SessionLog::default(),
            last_error: None,
            last_fetch_ok: false,
            in_flight: None,
            next_seq: 0,
            refetch_requested: false,
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// The last-known-good snapshot, if any fetch has succeeded yet.
    pub fn snapshot(&self) -> Option<&WorkflowSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn log(&self) -> &SessionLog {
        &self.log
    }

    /// The most recent fetch error, cleared by the next successful fetch.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Begin the session; the first fetch is now expected.
    pub fn start(&mut self) {
        if self.phase == SessionPhase::Idle {
            self.phase = SessionPhase::Connecting;
        }
    }

    /// Flip to teardown: no further fetches begin and any in-flight
    /// response is discarded on arrival.
    pub fn begin_teardown(&mut self) {
        self.phase = SessionPhase::TearingDown;
    }

    // ── Fetch bookkeeping ───────────────────────────────────────────

    pub fn fetch_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Claim the right to issue a snapshot fetch.
    ///
    /// Returns `None` while another fetch is outstanding (single-flight)
    /// or once teardown has begun.
    pub fn begin_fetch(&mut self) -> Option<FetchTicket> {
        if self.phase == SessionPhase::TearingDown || self.in_flight.is_some() {
            return None;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.in_flight = Some(seq);
        Some(FetchTicket {
            project_id: self.project_id.clone(),
            seq,
        })
    }

    /// Fold a completed fetch into the session.
    ///
    /// A response is applied only when the ticket's project id matches
    /// this session and the ticket is the one currently outstanding;
    /// everything else (a stale response for an abandoned project, a
    /// response arriving after teardown) is discarded without touching
    /// the cache. Failures keep the last-known-good snapshot.
    pub fn complete_fetch(
        &mut self,
        ticket: FetchTicket,
        result: Result<WorkflowSnapshot, SyncError>,
    ) -> FetchOutcome {
        if ticket.project_id != self.project_id
            || self.phase == SessionPhase::TearingDown
            || Some(ticket.seq) != self.in_flight
        {
            return FetchOutcome::Discarded;
        }
        self.in_flight = None;
        if self.phase == SessionPhase::Connecting {
            self.phase = SessionPhase::Active;
        }
        match result {
            Ok(snapshot) => {
                self.snapshot = Some(snapshot);
                self.last_fetch_ok = true;
                self.last_error = None;
                FetchOutcome::Applied
            }
            Err(e) => {
                let message = e.to_string();
                self.last_fetch_ok = false;
                self.last_error = Some(message.clone());
                FetchOutcome::Failed(message)
            }
        }
    }

    /// Ask for an out-of-band snapshot refetch. Requests arriving while a
    /// fetch is outstanding coalesce into a single rerun.
    pub fn request_refetch(&mut self) {
        self.refetch_requested = true;
    }

    /// Consume a pending refetch request, if any.
    pub fn take_refetch_request(&mut self) -> bool {
        std::mem::take(&mut self.refetch_requested)
    }

    /// Delay until the next scheduled poll.
    ///
    /// Short interval iff the last fetch succeeded and the cached
    /// snapshot shows a running step; failed fetches always fall back to
    /// the idle interval.
    pub fn poll_delay(&self, config: &SyncConfig) -> Duration {
        match &self.snapshot {
            Some(s) if self.last_fetch_ok && s.has_running_step() => config.active_poll_interval,
            _ => config.idle_poll_interval,
        }
    }

    // ── Log folding ─────────────────────────────────────────────────

    /// Fold one decoded event into the session log, in receipt order.
    ///
    /// Events that force a refetch (step transitions and progress
    /// updates) also set the coalesced refetch request. Returns the
    /// appended entry.
    pub fn apply_event(&mut self, event: &WorkflowEvent) -> LogEntry {
        let entry = LogEntry::from_event(event);
        self.log.append(entry.clone());
        if event.forces_refetch() {
            self.request_refetch();
        }
        entry
    }

    /// Append a lifecycle/diagnostic entry (socket opened, closed, errored).
    pub fn push_log(
        &mut self,
        level: LogLevel,
        message: impl Into<String>,
        step_id: Option<String>,
    ) -> LogEntry {
        let entry = LogEntry::new(level, message, step_id);
        self.log.append(entry.clone());
        entry
    }

    /// Record a successful command: an info-level summary entry plus a
    /// refetch request. The cache itself is never mutated speculatively;
    /// the refetched snapshot is the only source of new state.
    pub fn command_completed(
        &mut self,
        summary: impl Into<String>,
        step_id: Option<String>,
    ) -> LogEntry {
        let entry = self.push_log(LogLevel::Info, summary, step_id);
        self.request_refetch();
        entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::parse_event;
    use crate::types::StepStatus;

    fn snapshot(script_status: &str) -> WorkflowSnapshot {
        let step = |id: &str, status: &str| {
            format!(
                r#"{{"step_id": "{id}", "step_name": "{id}", "status": "{status}",
                    "dependencies": {{"is_met": true, "missing_dependencies": []}}}}"#
            )
        };
        serde_json::from_str(&format!(
            r#"{{
                "overall_status": "running",
                "step_1_import": {},
                "step_2_script": {},
                "step_3_novel": {},
                "step_4_alignment": {}
            }}"#,
            step("step_1_import", "completed"),
            step("step_2_script", script_status),
            step("step_3_novel", "ready"),
            step("step_4_alignment", "locked"),
        ))
        .unwrap()
    }

    fn fetch_error() -> SyncError {
        SyncError::Http {
            status: 502,
            detail: "Bad gateway".into(),
        }
    }

    #[test]
    fn test_phase_transitions() {
        let mut session = SyncSession::new("p1");
        assert_eq!(session.phase(), SessionPhase::Idle);

        session.start();
        assert_eq!(session.phase(), SessionPhase::Connecting);

        let ticket = session.begin_fetch().unwrap();
        session.complete_fetch(ticket, Ok(snapshot("running")));
        assert_eq!(session.phase(), SessionPhase::Active);

        session.begin_teardown();
        assert_eq!(session.phase(), SessionPhase::TearingDown);
    }

    #[test]
    fn test_first_failure_also_leaves_connecting() {
        let mut session = SyncSession::new("p1");
        session.start();
        let ticket = session.begin_fetch().unwrap();
        let outcome = session.complete_fetch(ticket, Err(fetch_error()));
        assert!(matches!(outcome, FetchOutcome::Failed(_)));
        // Loading is over even though the fetch failed
        assert_eq!(session.phase(), SessionPhase::Active);
        assert!(session.snapshot().is_none());
    }

    #[test]
    fn test_single_flight() {
        let mut session = SyncSession::new("p1");
        session.start();

        let ticket = session.begin_fetch().unwrap();
        assert!(session.begin_fetch().is_none());
        assert!(session.fetch_in_flight());

        session.complete_fetch(ticket, Ok(snapshot("ready")));
        assert!(!session.fetch_in_flight());
        assert!(session.begin_fetch().is_some());
    }

    #[test]
    fn test_stale_ticket_from_other_project_discarded() {
        let mut old = SyncSession::new("project-a");
        old.start();
        let stale = old.begin_fetch().unwrap();

        // The operator switched projects before the response arrived
        let mut current = SyncSession::new("project-b");
        current.start();
        let outcome = current.complete_fetch(stale, Ok(snapshot("running")));
        assert_eq!(outcome, FetchOutcome::Discarded);
        assert!(current.snapshot().is_none());
        // The discard did not release project-b's own fetch slot
        assert!(current.begin_fetch().is_some());
    }

    #[test]
    fn test_response_after_teardown_discarded() {
        let mut session = SyncSession::new("p1");
        session.start();
        let ticket = session.begin_fetch().unwrap();
        session.begin_teardown();

        let outcome = session.complete_fetch(ticket, Ok(snapshot("running")));
        assert_eq!(outcome, FetchOutcome::Discarded);
        assert!(session.snapshot().is_none());
        assert!(session.begin_fetch().is_none());
    }

    #[test]
    fn test_failed_fetch_keeps_last_known_good() {
        let mut session = SyncSession::new("p1");
        session.start();

        let ticket = session.begin_fetch().unwrap();
        session.complete_fetch(ticket, Ok(snapshot("running")));
        assert!(session.snapshot().is_some());

        let ticket = session.begin_fetch().unwrap();
        let outcome = session.complete_fetch(ticket, Err(fetch_error()));
        assert!(matches!(outcome, FetchOutcome::Failed(_)));
        // Cache untouched, error surfaced separately
        assert!(session.snapshot().is_some());
        assert!(session.last_error().unwrap().contains("502"));

        let ticket = session.begin_fetch().unwrap();
        session.complete_fetch(ticket, Ok(snapshot("ready")));
        assert!(session.last_error().is_none());
    }

    #[test]
    fn test_adaptive_poll_delay() {
        let config = SyncConfig::default();
        let mut session = SyncSession::new("p1");
        session.start();

        // No snapshot yet: idle cadence
        assert_eq!(session.poll_delay(&config), config.idle_poll_interval);

        let ticket = session.begin_fetch().unwrap();
        session.complete_fetch(ticket, Ok(snapshot("running")));
        assert_eq!(session.poll_delay(&config), config.active_poll_interval);

        let ticket = session.begin_fetch().unwrap();
        session.complete_fetch(ticket, Ok(snapshot("ready")));
        assert_eq!(session.poll_delay(&config), config.idle_poll_interval);
    }

    #[test]
    fn test_poll_delay_after_failure_is_idle() {
        let config = SyncConfig::default();
        let mut session = SyncSession::new("p1");
        session.start();

        let ticket = session.begin_fetch().unwrap();
        session.complete_fetch(ticket, Ok(snapshot("running")));
        assert_eq!(session.poll_delay(&config), config.active_poll_interval);

        // A failed fetch drops back to the idle cadence even though the
        // cached snapshot still shows a running step
        let ticket = session.begin_fetch().unwrap();
        session.complete_fetch(ticket, Err(fetch_error()));
        assert_eq!(session.poll_delay(&config), config.idle_poll_interval);
    }

    #[test]
    fn test_refetch_request_coalesces() {
        let mut session = SyncSession::new("p1");
        session.request_refetch();
        session.request_refetch();
        session.request_refetch();

        assert!(session.take_refetch_request());
        // All three collapsed into one
        assert!(!session.take_refetch_request());
    }

    #[test]
    fn test_apply_event_appends_and_requests_refetch() {
        let mut session = SyncSession::new("p1");
        let event = parse_event(
            r#"{"type": "step_completed", "step_id": "step_2_script", "step_name": "Script Analysis", "timestamp": "2026-08-06T10:00:00Z"}"#,
        )
        .unwrap();

        let entry = session.apply_event(&event);
        assert_eq!(entry.message, "Script Analysis completed");
        assert_eq!(session.log().len(), 1);
        assert!(session.take_refetch_request());
    }

    #[test]
    fn test_informational_event_does_not_request_refetch() {
        let mut session = SyncSession::new("p1");
        let event = parse_event(
            r#"{"type": "log", "step_id": "step_2_script", "level": "info", "message": "hello", "timestamp": ""}"#,
        )
        .unwrap();
        session.apply_event(&event);
        assert_eq!(session.log().len(), 1);
        assert!(!session.take_refetch_request());
    }

    #[test]
    fn test_command_completed_logs_info_and_requests_refetch() {
        let mut session = SyncSession::new("p1");
        let entry =
            session.command_completed("Started Script Analysis", Some("step_2_script".into()));
        assert_eq!(entry.level, LogLevel::Info);
        assert_eq!(entry.step_id.as_deref(), Some("step_2_script"));
        assert_eq!(session.log().len(), 1);
        assert!(session.take_refetch_request());
    }

    #[test]
    fn test_log_is_append_only() {
        let mut session = SyncSession::new("p1");
        session.push_log(LogLevel::Info, "first", None);
        let first_id = session.log().entries()[0].id.clone();

        for i in 0..10 {
            session.push_log(LogLevel::Info, format!("entry {i}"), None);
        }

        assert_eq!(session.log().len(), 11);
        assert_eq!(session.log().entries()[0].id, first_id);
        assert_eq!(session.log().entries()[0].message, "first");
    }

    #[test]
    fn test_snapshot_helper_statuses() {
        // Guard against the fixture drifting from the wire format
        let s = snapshot("running");
        assert_eq!(s.step_2_script.status, StepStatus::Running);
        assert!(s.has_running_step());
    }
}
