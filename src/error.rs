use std::path::PathBuf;

/// Boxed error returned by model collaborators (save, fit).
pub type ModelError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while gathering an evaluation batch.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("invalid collect request: {0}")]
    InvalidRequest(&'static str),

    #[error("batch {step}: expected {expected} label heads, found {found}")]
    ShapeMismatch {
        step: usize,
        expected: usize,
        found: usize,
    },

    #[error("batch {step}: label head {head} has {labels} samples but inputs have {inputs}")]
    SampleMismatch {
        step: usize,
        head: usize,
        inputs: usize,
        labels: usize,
    },

    #[error("batch {step}: raw inputs requested but the source did not provide them")]
    MissingRawInputs { step: usize },

    #[error("source exhausted after {pulled} of {steps} batches")]
    SourceExhausted { pulled: usize, steps: usize },
}

/// Errors that can occur when scoring predictions.
#[derive(Debug, thiserror::Error)]
pub enum MetricError {
    #[error("at least one class name is required")]
    NoClasses,

    #[error("class name at position {0} is blank")]
    BlankClassName(usize),

    #[error("duplicate class name '{0}'")]
    DuplicateClassName(String),

    #[error("expected {expected} {what} heads, found {found}")]
    HeadCount {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("class {class}: {predictions} predictions but {labels} labels")]
    LengthMismatch {
        class: usize,
        predictions: usize,
        labels: usize,
    },

    #[error("failed to read tensor data: {0}")]
    TensorData(String),
}

/// Errors raised by the improvement tracker.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("unknown improvement direction '{0}' (expected 'auto', 'min' or 'max')")]
    InvalidDirection(String),
}

/// Errors that can occur during checkpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("failed to copy {from} to {to}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to append to audit log {path}: {source}")]
    AuditLog {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to read training stats from {path}: {source}")]
    StatsRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse training stats from {path}: {source}")]
    StatsParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to write training stats to {path}: {source}")]
    StatsWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("weights path has no file name: {0}")]
    InvalidWeightsPath(PathBuf),

    #[error("invalid checkpoint path placeholder '{{{0}}}'")]
    PathTemplate(String),

    #[error("checkpoint period must be >= 1")]
    ZeroPeriod,

    #[error("failed to save model to {path}: {message}")]
    ModelSave { path: PathBuf, message: String },

    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("{field}: '{value}' is invalid, please use 'auto' or an integer")]
    InvalidStepSpecification { field: &'static str, value: String },

    #[error("config validation error: {0}")]
    Validation(String),
}

/// Errors surfaced by the epoch-end hook and the trainer.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("evaluation batch: {0}")]
    Collect(#[from] CollectError),

    #[error("scoring: {0}")]
    Metric(#[from] MetricError),

    #[error("checkpoint: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("model: {0}")]
    Model(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_error_display() {
        let err = CollectError::SourceExhausted {
            pulled: 2,
            steps: 5,
        };
        assert_eq!(err.to_string(), "source exhausted after 2 of 5 batches");
    }

    #[test]
    fn test_shape_mismatch_display() {
        let err = CollectError::ShapeMismatch {
            step: 3,
            expected: 14,
            found: 13,
        };
        assert_eq!(
            err.to_string(),
            "batch 3: expected 14 label heads, found 13"
        );
    }

    #[test]
    fn test_invalid_direction_display() {
        let err = TrackerError::InvalidDirection("sideways".to_string());
        assert_eq!(
            err.to_string(),
            "unknown improvement direction 'sideways' (expected 'auto', 'min' or 'max')"
        );
    }

    #[test]
    fn test_step_specification_names_field_and_value() {
        let err = ConfigError::InvalidStepSpecification {
            field: "train_steps",
            value: "five".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "train_steps: 'five' is invalid, please use 'auto' or an integer"
        );
    }

    #[test]
    fn test_supervisor_error_wraps_checkpoint() {
        let err: SupervisorError = CheckpointError::ZeroPeriod.into();
        assert_eq!(err.to_string(), "checkpoint: checkpoint period must be >= 1");
    }
}
