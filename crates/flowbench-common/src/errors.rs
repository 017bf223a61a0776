// Typed error taxonomy for the execution core.
//
// Recoverable run failures never surface as `Err` past an engine boundary;
// they terminate as an `Error` run state. These types cover the remaining
// fallible plumbing: boundary records, configuration, and template merging.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// A wire record was missing a field its phase requires.
    #[error("run record for phase {phase} is missing required field '{field}'")]
    MalformedRecord { field: String, phase: String },

    /// A wire record could not be (de)serialized at a boundary.
    #[error("failed to serialize run record: {0}")]
    RecordSerialization(#[from] serde_json::Error),

    /// A worker mapping names a registry key that no constructor provides.
    /// Raised at configuration validation time only; worker resolution
    /// itself never fails.
    #[error("worker mapping for image '{image}' names unknown implementation '{key}'")]
    UnknownWorkerImplementation { image: String, key: String },

    /// Engine settings could not be loaded.
    #[error("failed to load engine settings: {0}")]
    Settings(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_field() {
        let err = EngineError::MalformedRecord {
            field: "startedAt".to_string(),
            phase: "Running".to_string(),
        };
        assert!(err.to_string().contains("startedAt"));
        assert!(err.to_string().contains("Running"));
    }
}
