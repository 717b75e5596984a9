use serde::{Deserialize, Serialize};

/// Severity of a session log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }
}

/// Structured payload attached to `llm_thinking` log entries.
///
/// Viewers render this collapsed by default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmDetail {
    pub model: String,
    pub prompt_summary: String,
    pub response_summary: String,
}

/// One immutable entry in the session log.
///
/// Entries are only ever appended, in receipt order; out-of-order
/// timestamps are possible and preserved as delivered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    pub timestamp: String,
    pub level: LogLevel,
    pub message: String,
    pub step_id: Option<String>,
    pub detail: Option<LlmDetail>,
}

impl LogEntry {
    /// Create an entry stamped with the current time and a fresh id.
    pub fn new(level: LogLevel, message: impl Into<String>, step_id: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            level,
            message: message.into(),
            step_id,
            detail: None,
        }
    }

    /// Derive the log entry for a decoded workflow event.
    pub fn from_event(event: &WorkflowEvent) -> Self {
        let timestamp = if event.timestamp().is_empty() {
            chrono::Utc::now().to_rfc3339()
        } else {
            event.timestamp().to_string()
        };
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp,
            level: event.log_level(),
            message: event.log_message(),
            step_id: event.step_id().map(String::from),
            detail: event.llm_detail(),
        }
    }
}

/// Push events broadcast by the backend over `/projects/{id}/ws`.
///
/// Closed tagged union; frames with an unknown `type` discriminant or a
/// malformed payload fail to decode and are dropped by the stream handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    Connected {
        project_id: String,
        message: String,
        #[serde(default)]
        timestamp: String,
    },
    StepStarted {
        step_id: String,
        step_name: String,
        #[serde(default)]
        timestamp: String,
    },
    StepCompleted {
        step_id: String,
        step_name: String,
        quality_score: Option<u32>,
        #[serde(default)]
        timestamp: String,
    },
    StepFailed {
        step_id: String,
        step_name: String,
        error_message: String,
        #[serde(default)]
        timestamp: String,
    },
    ProgressUpdate {
        step_id: String,
        progress: f64,
        current_task: Option<String>,
        #[serde(default)]
        timestamp: String,
    },
    Log {
        step_id: String,
        level: LogLevel,
        message: String,
        #[serde(default)]
        timestamp: String,
    },
    LlmThinking {
        step_id: String,
        model: String,
        prompt_summary: String,
        response_summary: String,
        #[serde(default)]
        timestamp: String,
    },
}

impl WorkflowEvent {
    /// The step this event concerns, if any.
    pub fn step_id(&self) -> Option<&str> {
        match self {
            WorkflowEvent::Connected { .. } => None,
            WorkflowEvent::StepStarted { step_id, .. }
            | WorkflowEvent::StepCompleted { step_id, .. }
            | WorkflowEvent::StepFailed { step_id, .. }
            | WorkflowEvent::ProgressUpdate { step_id, .. }
            | WorkflowEvent::Log { step_id, .. }
            | WorkflowEvent::LlmThinking { step_id, .. } => Some(step_id),
        }
    }

    pub fn timestamp(&self) -> &str {
        match self {
            WorkflowEvent::Connected { timestamp, .. }
            | WorkflowEvent::StepStarted { timestamp, .. }
            | WorkflowEvent::StepCompleted { timestamp, .. }
            | WorkflowEvent::StepFailed { timestamp, .. }
            | WorkflowEvent::ProgressUpdate { timestamp, .. }
            | WorkflowEvent::Log { timestamp, .. }
            | WorkflowEvent::LlmThinking { timestamp, .. } => timestamp,
        }
    }

    /// Whether this event forces an immediate snapshot refetch, ahead of
    /// the scheduled poll.
    ///
    /// Progress updates force one too, matching the backend's observed
    /// contract; the session coalesces bursts into single fetches.
    pub fn forces_refetch(&self) -> bool {
        matches!(
            self,
            WorkflowEvent::StepStarted { .. }
                | WorkflowEvent::StepCompleted { .. }
                | WorkflowEvent::StepFailed { .. }
                | WorkflowEvent::ProgressUpdate { .. }
        )
    }

    /// Log level for the derived session log entry.
    pub fn log_level(&self) -> LogLevel {
        match self {
            WorkflowEvent::StepFailed { .. } => LogLevel::Error,
            WorkflowEvent::Log { level, .. } => *level,
            _ => LogLevel::Info,
        }
    }

    fn log_message(&self) -> String {
        match self {
            WorkflowEvent::Connected { message, .. } => message.clone(),
            WorkflowEvent::StepStarted { step_name, .. } => {
                format!("{step_name} started")
            }
            WorkflowEvent::StepCompleted { step_name, .. } => {
                format!("{step_name} completed")
            }
            WorkflowEvent::StepFailed {
                step_name,
                error_message,
                ..
            } => format!("{step_name} failed: {error_message}"),
            WorkflowEvent::ProgressUpdate {
                step_id,
                progress,
                current_task,
                ..
            } => match current_task {
                Some(task) => task.clone(),
                None => format!("{step_id} progress: {progress:.0}%"),
            },
            WorkflowEvent::Log { message, .. } => message.clone(),
            WorkflowEvent::LlmThinking { model, .. } => format!("LLM thinking ({model})"),
        }
    }

    fn llm_detail(&self) -> Option<LlmDetail> {
        match self {
            WorkflowEvent::LlmThinking {
                model,
                prompt_summary,
                response_summary,
                ..
            } => Some(LlmDetail {
                model: model.clone(),
                prompt_summary: prompt_summary.clone(),
                response_summary: response_summary.clone(),
            }),
            _ => None,
        }
    }
}

/// Decode one WebSocket text frame into a workflow event.
pub fn parse_event(text: &str) -> Result<WorkflowEvent, serde_json::Error> {
    serde_json::from_str(text)
}
