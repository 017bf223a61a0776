// flowbench-common: Shared value types and infrastructure for the flowbench
// execution core.

pub mod errors;
pub mod logging;
pub mod run;
pub mod run_record;
pub mod run_state;
pub mod settings;
pub mod template;
pub mod update;

// ---------------------------------------------------------------------------
// Re-exports for convenient access
// ---------------------------------------------------------------------------

pub use errors::EngineError;
pub use run::{ExecutedStep, RankingEntry, Run};
pub use run_record::{RunPhase, RunRecord};
pub use run_state::RunState;
pub use settings::EngineSettings;
pub use template::{ParameterDecl, TemplateError, WorkflowTemplate};
pub use update::{RecordingUpdateHandler, RunUpdateHandler};
