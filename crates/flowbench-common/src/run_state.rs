// Run lifecycle state machine.
// Every transition produces a new value; the previous state is never mutated.

use chrono::{DateTime, Utc};
use std::mem;

/// The lifecycle state of one workflow run.
///
/// Only `Pending` and `Running` are active; `Success`, `Error`, and
/// `Canceled` are terminal. Transition methods are defined per source
/// variant; invoking a transition that is undefined for the current variant
/// is a programming error and panics.
///
/// `PartialEq` compares the variant tag ONLY. Two `Running` states with
/// different timestamps compare equal. The remote monitor relies on this to
/// suppress redundant state forwards, so a re-announced `Running` with a
/// later `started_at` is deliberately not treated as a change.
#[derive(Debug, Clone, Eq)]
pub enum RunState {
    Pending {
        created_at: DateTime<Utc>,
    },
    Running {
        created_at: DateTime<Utc>,
        started_at: DateTime<Utc>,
    },
    Success {
        created_at: DateTime<Utc>,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        output_files: Vec<String>,
    },
    Error {
        created_at: DateTime<Utc>,
        started_at: DateTime<Utc>,
        stopped_at: DateTime<Utc>,
        messages: Vec<String>,
    },
    Canceled {
        created_at: DateTime<Utc>,
        started_at: DateTime<Utc>,
        stopped_at: DateTime<Utc>,
        messages: Vec<String>,
    },
}

impl PartialEq for RunState {
    fn eq(&self, other: &Self) -> bool {
        mem::discriminant(self) == mem::discriminant(other)
    }
}

impl RunState {
    /// Create the initial `Pending` state, stamped now.
    pub fn pending() -> Self {
        RunState::Pending {
            created_at: Utc::now(),
        }
    }

    /// Pending → Running. Panics for any other source variant.
    pub fn start(&self) -> Self {
        match self {
            RunState::Pending { created_at } => RunState::Running {
                created_at: *created_at,
                started_at: Utc::now(),
            },
            other => panic!("start() is not defined for {}", other.phase_name()),
        }
    }

    /// Running → Success. Panics for any other source variant.
    pub fn success(&self, output_files: Vec<String>) -> Self {
        match self {
            RunState::Running {
                created_at,
                started_at,
            } => RunState::Success {
                created_at: *created_at,
                started_at: *started_at,
                finished_at: Utc::now(),
                output_files,
            },
            other => panic!("success() is not defined for {}", other.phase_name()),
        }
    }

    /// Pending | Running → Error. A run whose creation fails may error
    /// without ever having run; `started_at` is stamped at transition time
    /// in that case. Panics for terminal source variants.
    pub fn error(&self, messages: Vec<String>) -> Self {
        let now = Utc::now();
        match self {
            RunState::Pending { created_at } => RunState::Error {
                created_at: *created_at,
                started_at: now,
                stopped_at: now,
                messages,
            },
            RunState::Running {
                created_at,
                started_at,
            } => RunState::Error {
                created_at: *created_at,
                started_at: *started_at,
                stopped_at: now,
                messages,
            },
            other => panic!("error() is not defined for {}", other.phase_name()),
        }
    }

    /// Pending | Running → Canceled. Panics for terminal source variants.
    pub fn cancel(&self, messages: Vec<String>) -> Self {
        let now = Utc::now();
        match self {
            RunState::Pending { created_at } => RunState::Canceled {
                created_at: *created_at,
                started_at: now,
                stopped_at: now,
                messages,
            },
            RunState::Running {
                created_at,
                started_at,
            } => RunState::Canceled {
                created_at: *created_at,
                started_at: *started_at,
                stopped_at: now,
                messages,
            },
            other => panic!("cancel() is not defined for {}", other.phase_name()),
        }
    }

    // -----------------------------------------------------------------------
    // Predicates
    // -----------------------------------------------------------------------

    pub fn is_pending(&self) -> bool {
        matches!(self, RunState::Pending { .. })
    }

    pub fn is_running(&self) -> bool {
        matches!(self, RunState::Running { .. })
    }

    /// `Pending` or `Running`.
    pub fn is_active(&self) -> bool {
        self.is_pending() || self.is_running()
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunState::Success { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RunState::Error { .. })
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, RunState::Canceled { .. })
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    /// The creation timestamp, present on every variant.
    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            RunState::Pending { created_at }
            | RunState::Running { created_at, .. }
            | RunState::Success { created_at, .. }
            | RunState::Error { created_at, .. }
            | RunState::Canceled { created_at, .. } => *created_at,
        }
    }

    /// The variant name, as used in the wire record `type` field.
    pub fn phase_name(&self) -> &'static str {
        match self {
            RunState::Pending { .. } => "Pending",
            RunState::Running { .. } => "Running",
            RunState::Success { .. } => "Success",
            RunState::Error { .. } => "Error",
            RunState::Canceled { .. } => "Canceled",
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.phase_name())
    }
}
