//! The durable record describing one run, written once at run end and read
//! back for listing, loading, and transcript replay.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::RunId;
use crate::llm::LlmMessage;
use crate::messages::ChatMessage;

/// Outcome of one orchestrator invocation; drives the run controller's
/// branching and is recorded in the manifest.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopReason {
    /// A terminal message contained a completion sentinel phrase.
    Sentinel { phrase: String },
    /// An agent handed off to the human operator.
    UserHandoff { source: String },
    /// The per-invocation turn budget was consumed.
    MaxTurns { limit: u32 },
    /// Cancellation was requested between turns.
    Aborted,
    /// None of the known conditions matched; continuation is degraded.
    Unrecognized { detail: String },
}

impl StopReason {
    /// Only a sentinel stop marks the run completed.
    pub fn is_completion(&self) -> bool {
        matches!(self, StopReason::Sentinel { .. })
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Sentinel { phrase } => write!(f, "completion sentinel '{phrase}' observed"),
            StopReason::UserHandoff { source } => write!(f, "handoff to user from {source}"),
            StopReason::MaxTurns { limit } => write!(f, "max turns ({limit}) reached"),
            StopReason::Aborted => write!(f, "aborted"),
            StopReason::Unrecognized { detail } => write!(f, "unrecognized: {detail}"),
        }
    }
}

/// Full serialized orchestrator state: the ordered message thread plus each
/// agent's private LLM context. The thread alone reconstructs the transcript;
/// the contexts make the snapshot self-contained.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TeamState {
    pub message_thread: Vec<ChatMessage>,
    pub agent_contexts: BTreeMap<String, Vec<LlmMessage>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunManifest {
    pub id: RunId,
    pub user_intent: String,
    pub interactive: bool,
    pub max_turns: u32,
    /// Sandbox readiness deadline in seconds. Field name kept for manifest
    /// compatibility with earlier tooling.
    pub docker_wait_time: u64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Seconds between start and end.
    pub duration: f64,
    pub completed: bool,
    pub stop_reason: StopReason,
    pub model_provider: String,
    pub model: String,
    pub team_state: TeamState,
}

/// One row of `list()`: the manifest minus the (potentially large) state blob.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunSummary {
    pub id: RunId,
    pub user_intent: String,
    pub start_time: DateTime<Utc>,
    pub duration: f64,
    pub completed: bool,
    pub stop_reason: StopReason,
    pub model_provider: String,
    pub model: String,
}

impl From<&RunManifest> for RunSummary {
    fn from(manifest: &RunManifest) -> Self {
        Self {
            id: manifest.id.clone(),
            user_intent: manifest.user_intent.clone(),
            start_time: manifest.start_time,
            duration: manifest.duration,
            completed: manifest.completed,
            stop_reason: manifest.stop_reason.clone(),
            model_provider: manifest.model_provider.clone(),
            model: manifest.model.clone(),
        }
    }
}
