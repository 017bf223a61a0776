// The flat wire record for run states.
// This is the exact shape passed across the engine/pool and the
// engine/remote-client boundaries and must round-trip losslessly.

use crate::errors::EngineError;
use crate::run_state::RunState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The variant tag of a [`RunRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunPhase {
    Pending,
    Running,
    Success,
    Error,
    Canceled,
}

/// Flat serialized form of a [`RunState`].
///
/// `startedAt` is required for all phases but `Pending`; `finishedAt` and
/// `files` are required for `Success`; `stoppedAt` and `messages` are
/// required for `Error` and `Canceled`. [`RunRecord::try_into`] enforces
/// these rules when crossing back into a `RunState`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    #[serde(rename = "type")]
    pub phase: RunPhase,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "startedAt", default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(
        rename = "finishedAt",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(rename = "stoppedAt", default, skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<String>>,
}

impl From<&RunState> for RunRecord {
    fn from(state: &RunState) -> Self {
        match state {
            RunState::Pending { created_at } => RunRecord {
                phase: RunPhase::Pending,
                created_at: *created_at,
                started_at: None,
                finished_at: None,
                stopped_at: None,
                messages: None,
                files: None,
            },
            RunState::Running {
                created_at,
                started_at,
            } => RunRecord {
                phase: RunPhase::Running,
                created_at: *created_at,
                started_at: Some(*started_at),
                finished_at: None,
                stopped_at: None,
                messages: None,
                files: None,
            },
            RunState::Success {
                created_at,
                started_at,
                finished_at,
                output_files,
            } => RunRecord {
                phase: RunPhase::Success,
                created_at: *created_at,
                started_at: Some(*started_at),
                finished_at: Some(*finished_at),
                stopped_at: None,
                messages: None,
                files: Some(output_files.clone()),
            },
            RunState::Error {
                created_at,
                started_at,
                stopped_at,
                messages,
            } => RunRecord {
                phase: RunPhase::Error,
                created_at: *created_at,
                started_at: Some(*started_at),
                finished_at: None,
                stopped_at: Some(*stopped_at),
                messages: Some(messages.clone()),
                files: None,
            },
            RunState::Canceled {
                created_at,
                started_at,
                stopped_at,
                messages,
            } => RunRecord {
                phase: RunPhase::Canceled,
                created_at: *created_at,
                started_at: Some(*started_at),
                finished_at: None,
                stopped_at: Some(*stopped_at),
                messages: Some(messages.clone()),
                files: None,
            },
        }
    }
}

impl TryFrom<RunRecord> for RunState {
    type Error = EngineError;

    fn try_from(record: RunRecord) -> Result<Self, EngineError> {
        let missing = |field: &str, phase: RunPhase| EngineError::MalformedRecord {
            field: field.to_string(),
            phase: format!("{phase:?}"),
        };

        match record.phase {
            RunPhase::Pending => Ok(RunState::Pending {
                created_at: record.created_at,
            }),
            RunPhase::Running => Ok(RunState::Running {
                created_at: record.created_at,
                started_at: record
                    .started_at
                    .ok_or_else(|| missing("startedAt", record.phase))?,
            }),
            RunPhase::Success => Ok(RunState::Success {
                created_at: record.created_at,
                started_at: record
                    .started_at
                    .ok_or_else(|| missing("startedAt", record.phase))?,
                finished_at: record
                    .finished_at
                    .ok_or_else(|| missing("finishedAt", record.phase))?,
                output_files: record
                    .files
                    .ok_or_else(|| missing("files", record.phase))?,
            }),
            RunPhase::Error => Ok(RunState::Error {
                created_at: record.created_at,
                started_at: record
                    .started_at
                    .ok_or_else(|| missing("startedAt", record.phase))?,
                stopped_at: record
                    .stopped_at
                    .ok_or_else(|| missing("stoppedAt", record.phase))?,
                messages: record
                    .messages
                    .ok_or_else(|| missing("messages", record.phase))?,
            }),
            RunPhase::Canceled => Ok(RunState::Canceled {
                created_at: record.created_at,
                started_at: record
                    .started_at
                    .ok_or_else(|| missing("startedAt", record.phase))?,
                stopped_at: record
                    .stopped_at
                    .ok_or_else(|| missing("stoppedAt", record.phase))?,
                messages: record
                    .messages
                    .ok_or_else(|| missing("messages", record.phase))?,
            }),
        }
    }
}

impl RunRecord {
    /// Serialize to the JSON boundary form.
    pub fn to_json(&self) -> Result<String, EngineError> {
        serde_json::to_string(self).map_err(EngineError::RecordSerialization)
    }

    /// Deserialize from the JSON boundary form.
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        serde_json::from_str(json).map_err(EngineError::RecordSerialization)
    }
}
