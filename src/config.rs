use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::warn;

use crate::checkpoint::PeriodicCheckpointConfig;
use crate::error::ConfigError;

/// Number of steps for a phase: derived from the dataset size, or fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepSpec {
    Auto,
    Fixed(usize),
}

impl StepSpec {
    /// Parse a raw config value. `"auto"` passes through; anything else must be
    /// an integer, otherwise the error names `field` and the literal value.
    pub fn parse(field: &'static str, raw: &str) -> Result<Self, ConfigError> {
        let trimmed = raw.trim();
        if trimmed == "auto" {
            return Ok(StepSpec::Auto);
        }
        trimmed
            .parse::<usize>()
            .map(StepSpec::Fixed)
            .map_err(|_| ConfigError::InvalidStepSpecification {
                field,
                value: raw.to_string(),
            })
    }

    /// Concrete step count. `Auto` covers the data once, at least one step.
    pub fn steps_for(self, sample_count: usize, batch_size: usize) -> usize {
        match self {
            StepSpec::Fixed(steps) => steps,
            StepSpec::Auto => (sample_count / batch_size.max(1)).max(1),
        }
    }
}

impl fmt::Display for StepSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepSpec::Auto => f.write_str("auto"),
            StepSpec::Fixed(steps) => write!(f, "{steps}"),
        }
    }
}

/// A step value as written in TOML: `train_steps = 5` or `train_steps = "auto"`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum StepValue {
    Count(u64),
    Text(String),
}

impl Default for StepValue {
    fn default() -> Self {
        StepValue::Text("auto".to_string())
    }
}

impl StepValue {
    pub fn resolve(&self, field: &'static str) -> Result<StepSpec, ConfigError> {
        match self {
            StepValue::Count(n) => usize::try_from(*n).map(StepSpec::Fixed).map_err(|_| {
                ConfigError::InvalidStepSpecification {
                    field,
                    value: n.to_string(),
                }
            }),
            StepValue::Text(raw) => StepSpec::parse(field, raw),
        }
    }
}

/// Which phase a per-phase setting applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Train,
    Test,
}

impl FromStr for Phase {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "train" => Ok(Phase::Train),
            "test" => Ok(Phase::Test),
            other => Err(ConfigError::Validation(format!("unknown phase '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub verbosity: u8,
    pub output_dir: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        GeneralConfig {
            verbosity: 0,
            output_dir: PathBuf::from("output"),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub initial_learning_rate: f64,
    pub train_steps: StepValue,
    pub validation_steps: StepValue,
    pub patience_reduce_lr: usize,
    pub progress_verbosity: u8,
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig {
            epochs: 20,
            batch_size: 32,
            initial_learning_rate: 0.0001,
            train_steps: StepValue::default(),
            validation_steps: StepValue::default(),
            patience_reduce_lr: 1,
            progress_verbosity: 1,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TestConfig {
    pub progress_verbosity: u8,
}

impl Default for TestConfig {
    fn default() -> Self {
        TestConfig {
            progress_verbosity: 1,
        }
    }
}

/// Settings for the AUROC supervisor and its artifacts.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub class_names: Vec<String>,
    /// "Latest" weights, rewritten every epoch, relative to `output_dir`.
    pub weights_file: String,
    pub final_model_file: String,
    pub save_final_weights_only: bool,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        SupervisorConfig {
            class_names: Vec::new(),
            weights_file: "weights.mpk".to_string(),
            final_model_file: "final_model.mpk".to_string(),
            save_final_weights_only: false,
        }
    }
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ResumeConfig {
    pub use_trained_model_weights: bool,
    pub force_resplit: bool,
}

/// Top-level application configuration, loadable from TOML.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub train: TrainConfig,
    pub test: TestConfig,
    pub supervisor: SupervisorConfig,
    pub resume: ResumeConfig,
    pub checkpoint: PeriodicCheckpointConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the file
    /// does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            warn!(path = %path.display(), "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.train.epochs == 0 {
            return Err(ConfigError::Validation("train.epochs must be > 0".into()));
        }
        if self.train.batch_size == 0 {
            return Err(ConfigError::Validation("train.batch_size must be > 0".into()));
        }
        if self.train.initial_learning_rate <= 0.0 {
            return Err(ConfigError::Validation(
                "train.initial_learning_rate must be > 0".into(),
            ));
        }
        if self.train_steps()? == StepSpec::Fixed(0) {
            return Err(ConfigError::Validation("train.train_steps must be >= 1".into()));
        }
        if self.validation_steps()? == StepSpec::Fixed(0) {
            return Err(ConfigError::Validation(
                "train.validation_steps must be >= 1".into(),
            ));
        }
        if self.supervisor.weights_file.trim().is_empty() {
            return Err(ConfigError::Validation(
                "supervisor.weights_file must not be empty".into(),
            ));
        }
        if self.checkpoint.enabled && self.checkpoint.period == 0 {
            return Err(ConfigError::Validation("checkpoint.period must be >= 1".into()));
        }
        Ok(())
    }

    pub fn train_steps(&self) -> Result<StepSpec, ConfigError> {
        self.train.train_steps.resolve("train_steps")
    }

    pub fn validation_steps(&self) -> Result<StepSpec, ConfigError> {
        self.train.validation_steps.resolve("validation_steps")
    }

    pub fn progress_verbosity(&self, phase: Phase) -> u8 {
        match phase {
            Phase::Train => self.train.progress_verbosity,
            Phase::Test => self.test.progress_verbosity,
        }
    }

    /// Resuming only makes sense with trained weights and an unchanged split.
    pub fn is_resume_mode(&self) -> bool {
        self.resume.use_trained_model_weights && !self.resume.force_resplit
    }

    /// Resumable snapshot, written next to the weights file.
    pub fn train_stats_file(&self) -> PathBuf {
        self.weights_path().with_file_name(".training_stats.json")
    }

    pub fn weights_path(&self) -> PathBuf {
        self.general.output_dir.join(&self.supervisor.weights_file)
    }

    pub fn final_model_path(&self) -> PathBuf {
        self.general.output_dir.join(&self.supervisor.final_model_file)
    }

    /// Periodic checkpoint template, anchored in `output_dir` when relative.
    pub fn periodic_checkpoint(&self) -> PeriodicCheckpointConfig {
        let mut config = self.checkpoint.clone();
        if Path::new(&config.filepath).is_relative() {
            config.filepath = self
                .general
                .output_dir
                .join(&config.filepath)
                .to_string_lossy()
                .into_owned();
        }
        config
    }

    /// Generate a TOML string with all default values (useful for creating
    /// example config files).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&AppConfig::default()).expect("default config serializes")
    }
}
