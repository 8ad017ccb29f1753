//! Job identity, lifecycle, and the polling caller's view of a job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Correlation id for one submitted job.
///
/// Freshly generated at dispatch time unless the caller supplies its
/// own id for an idempotent retry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generate a fresh v4 id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wrap a caller-supplied id.
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The closed set of job kinds this service runs.
///
/// Each kind maps to a statically registered handler, validated at
/// startup rather than resolved at call time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Single-cell simulation, fanned out per stimulus amplitude.
    SingleCell,
    /// Circuit simulation, fanned out per input frequency.
    Circuit,
    /// Synapse placement on a reconstructed morphology.
    SynapsePlacement,
    /// Mesh connectivity analysis.
    MeshAnalysis,
}

impl JobKind {
    /// Every kind, for startup validation of handler coverage.
    pub fn all() -> [JobKind; 4] {
        [
            JobKind::SingleCell,
            JobKind::Circuit,
            JobKind::SynapsePlacement,
            JobKind::MeshAnalysis,
        ]
    }

    /// The snake_case name used on the wire and the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::SingleCell => "single_cell",
            JobKind::Circuit => "circuit",
            JobKind::SynapsePlacement => "synapse_placement",
            JobKind::MeshAnalysis => "mesh_analysis",
        }
    }

    /// Parse the snake_case name back into a kind.
    pub fn parse(name: &str) -> Option<JobKind> {
        JobKind::all().into_iter().find(|k| k.as_str() == name)
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a job. Strictly forward-moving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Accepted, waiting for a runner slot.
    Queued,
    /// A runner picked the job up.
    Running,
    /// Finished without error.
    Succeeded,
    /// Finished with an error, or timed out.
    Failed,
}

impl JobState {
    /// Whether no further transitions can happen.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }

    /// Position in the forward order. Used to reject regressions and
    /// to replay skipped transitions in logical order.
    pub fn rank(&self) -> u8 {
        match self {
            JobState::Queued => 0,
            JobState::Running => 1,
            JobState::Succeeded => 2,
            JobState::Failed => 2,
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// The caller-visible handle returned at dispatch time.
///
/// Immutable; owned by the caller until the job reaches a terminal
/// state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobHandle {
    /// Correlation id.
    pub id: JobId,
    /// What was submitted.
    pub kind: JobKind,
    /// When the dispatcher accepted the job.
    pub submitted_at: DateTime<Utc>,
}

/// Bookkeeping record for polling callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    /// Correlation id.
    pub id: JobId,
    /// What was submitted.
    pub kind: JobKind,
    /// Current lifecycle state.
    pub status: JobState,
    /// Jobs ahead of this one while queued, if known.
    pub queue_position: Option<u32>,
    /// Human-readable failure detail once failed.
    pub error: Option<String>,
    /// When the job was accepted.
    pub created_at: DateTime<Utc>,
    /// When a runner picked the job up.
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state.
    pub ended_at: Option<DateTime<Utc>>,
}
