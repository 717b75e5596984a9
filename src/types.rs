use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Lifecycle status shared by the pipeline, its steps, and per-episode
/// sub-units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Locked,
    Ready,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Locked => "locked",
            StepStatus::Ready => "ready",
            StepStatus::Running => "running",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "locked" => Some(StepStatus::Locked),
            "ready" => Some(StepStatus::Ready),
            "running" => Some(StepStatus::Running),
            "completed" => Some(StepStatus::Completed),
            "failed" => Some(StepStatus::Failed),
            "cancelled" => Some(StepStatus::Cancelled),
            _ => None,
        }
    }

    /// Completed, failed, and cancelled steps will not change again
    /// without an explicit restart.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::Failed | StepStatus::Cancelled
        )
    }
}

/// The four fixed pipeline steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepId {
    Import,
    ScriptAnalysis,
    NovelAnalysis,
    Alignment,
}

impl StepId {
    /// All steps in pipeline order.
    pub const ALL: [StepId; 4] = [
        StepId::Import,
        StepId::ScriptAnalysis,
        StepId::NovelAnalysis,
        StepId::Alignment,
    ];

    /// The wire identifier used in API paths and event payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepId::Import => "step_1_import",
            StepId::ScriptAnalysis => "step_2_script",
            StepId::NovelAnalysis => "step_3_novel",
            StepId::Alignment => "step_4_alignment",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "step_1_import" => Some(StepId::Import),
            "step_2_script" => Some(StepId::ScriptAnalysis),
            "step_3_novel" => Some(StepId::NovelAnalysis),
            "step_4_alignment" => Some(StepId::Alignment),
            _ => None,
        }
    }

    /// Human-readable step title.
    pub fn display_name(&self) -> &'static str {
        match self {
            StepId::Import => "Import",
            StepId::ScriptAnalysis => "Script Analysis",
            StepId::NovelAnalysis => "Novel Analysis",
            StepId::Alignment => "Script-Novel Alignment",
        }
    }

    /// Human-readable reason this step is locked, or `None` when its
    /// dependencies are met.
    ///
    /// The mapping is static per step identity; the contents of
    /// `missing_dependencies` are not consulted.
    pub fn lock_reason(&self, dependencies: &DependencyCheck) -> Option<&'static str> {
        if dependencies.is_met {
            return None;
        }
        match self {
            StepId::Import => None,
            StepId::ScriptAnalysis | StepId::NovelAnalysis => {
                Some("Requires Import step to be completed")
            }
            StepId::Alignment => {
                Some("Requires Script Analysis and Novel Analysis to be completed")
            }
        }
    }
}

/// Server-evaluated dependency gate for one step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyCheck {
    pub is_met: bool,
    #[serde(default)]
    pub missing_dependencies: Vec<String>,
    pub message: Option<String>,
}

/// Per-episode progress inside the script analysis step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeState {
    pub status: StepStatus,
    pub progress_percentage: Option<f64>,
    pub quality_score: Option<u32>,
    #[serde(default)]
    pub llm_calls: u64,
    #[serde(default)]
    pub cost: f64,
    #[serde(default)]
    pub processing_time: f64,
    pub error_message: Option<String>,
}

/// Server-reported state of a single pipeline step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepState {
    pub step_id: String,
    pub step_name: String,
    pub status: StepStatus,
    pub dependencies: DependencyCheck,
    #[serde(default)]
    pub overall_progress: f64,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub last_updated: Option<String>,
    pub error_message: Option<String>,
    pub quality_score: Option<u32>,
    pub result_path: Option<String>,
    #[serde(default)]
    pub llm_calls_count: u64,
    #[serde(default)]
    pub total_cost: f64,
    #[serde(default)]
    pub processing_time: f64,
    /// Present only for steps with sub-unit granularity (script analysis).
    #[serde(default)]
    pub episodes_status: BTreeMap<String, EpisodeState>,
}

/// The authoritative server-computed view of one project's pipeline.
///
/// Fetched read-only from `GET /projects/{id}/workflow-state`; never
/// constructed client-side except in tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    #[serde(default)]
    pub phase_name: String,
    pub overall_status: StepStatus,
    #[serde(default)]
    pub overall_progress: f64,
    pub step_1_import: StepState,
    pub step_2_script: StepState,
    pub step_3_novel: StepState,
    pub step_4_alignment: StepState,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    #[serde(default)]
    pub total_llm_calls: u64,
    #[serde(default)]
    pub total_cost: f64,
    #[serde(default)]
    pub total_processing_time: f64,
}

impl WorkflowSnapshot {
    /// The state record for one step.
    pub fn step(&self, id: StepId) -> &StepState {
        match id {
            StepId::Import => &self.step_1_import,
            StepId::ScriptAnalysis => &self.step_2_script,
            StepId::NovelAnalysis => &self.step_3_novel,
            StepId::Alignment => &self.step_4_alignment,
        }
    }

    /// All steps in pipeline order.
    pub fn steps(&self) -> [(StepId, &StepState); 4] {
        [
            (StepId::Import, &self.step_1_import),
            (StepId::ScriptAnalysis, &self.step_2_script),
            (StepId::NovelAnalysis, &self.step_3_novel),
            (StepId::Alignment, &self.step_4_alignment),
        ]
    }

    /// Whether any step is currently running. Drives the adaptive poll
    /// cadence.
    pub fn has_running_step(&self) -> bool {
        self.steps()
            .iter()
            .any(|(_, step)| step.status == StepStatus::Running)
    }
}

/// Acknowledgement returned by step-level commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepAck {
    pub message: String,
    pub step_id: String,
}

/// Acknowledgement returned by episode-level commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeAck {
    pub message: String,
    pub episode_id: String,
}

/// Acknowledgement returned by the progress-report command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressAck {
    pub message: String,
    pub progress: f64,
}
