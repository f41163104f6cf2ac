use std::path::PathBuf;

use burn::prelude::*;
use tracing::{info, warn};

use crate::checkpoint::{save_model, PeriodicCheckpoint, PeriodicOutcome};
use crate::config::AppConfig;
use crate::error::{CheckpointError, SupervisorError};
use crate::training::model::{Checkpointable, Fit, SourceBatch};
use crate::training::supervisor::AurocSupervisor;

/// The per-epoch "latest" file only needs the weights.
const LATEST_WEIGHTS_ONLY: bool = true;

/// What happened over a whole [`Trainer::run`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingSummary {
    pub epochs_run: usize,
    /// 0-based epochs whose mean AUROC was promoted to "best".
    pub improved_epochs: Vec<usize>,
    /// 0-based epochs whose evaluation or checkpointing failed.
    pub failed_epochs: Vec<usize>,
    pub best_mean_auroc: f64,
    pub final_model: Option<PathBuf>,
}

/// Drives the epoch loop and calls the supervisor explicitly after each epoch.
pub struct Trainer {
    epochs: usize,
    weights_path: PathBuf,
    final_model_path: PathBuf,
    save_final_weights_only: bool,
    periodic: Option<PeriodicCheckpoint>,
}

impl Trainer {
    pub fn new(config: &AppConfig) -> Result<Self, SupervisorError> {
        let periodic = if config.checkpoint.enabled {
            Some(PeriodicCheckpoint::new(config.periodic_checkpoint())?)
        } else {
            None
        };
        Ok(Trainer {
            epochs: config.train.epochs,
            weights_path: config.weights_path(),
            final_model_path: config.final_model_path(),
            save_final_weights_only: config.supervisor.save_final_weights_only,
            periodic,
        })
    }

    /// Run the full training loop.
    ///
    /// `eval_source` is called once per epoch and must hand back the validation
    /// stream from its start, so every epoch is scored on the same samples.
    /// Model errors abort the run; evaluation and checkpoint errors are logged
    /// and the loop moves on to the next epoch.
    pub fn run<B, const D: usize, M, F, I>(
        &mut self,
        model: &mut M,
        supervisor: &mut AurocSupervisor,
        mut eval_source: F,
    ) -> Result<TrainingSummary, SupervisorError>
    where
        B: Backend,
        M: Fit<B, D>,
        F: FnMut() -> I,
        I: Iterator<Item = SourceBatch<B, D>>,
    {
        let mut summary = TrainingSummary::default();

        info!(epochs = self.epochs, "starting training");
        for epoch in 0..self.epochs {
            let logs = model
                .fit_epoch(epoch)
                .map_err(|e| SupervisorError::Model(e.to_string()))?;
            save_model(&*model, &self.weights_path, LATEST_WEIGHTS_ONLY)?;

            match supervisor.on_epoch_end(epoch, &*model, &mut eval_source()) {
                Ok(report) => {
                    if report.outcome.improved() {
                        summary.improved_epochs.push(epoch);
                    }
                }
                Err(e) => {
                    warn!(epoch = epoch + 1, error = %e, "epoch-end evaluation failed");
                    summary.failed_epochs.push(epoch);
                }
            }

            if let Some(periodic) = self.periodic.as_mut() {
                match periodic.on_epoch_end(epoch, &logs, &*model) {
                    Ok(PeriodicOutcome::Saved(path)) => {
                        info!(epoch = epoch + 1, path = %path.display(), "periodic checkpoint saved")
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(epoch = epoch + 1, error = %e, "periodic checkpoint failed")
                    }
                }
            }
            summary.epochs_run += 1;
        }

        let final_model = self.save_final_model(&*model)?;
        info!(
            path = %final_model.display(),
            best_mean_auroc = supervisor.best_mean_auroc(),
            "training complete"
        );

        summary.best_mean_auroc = supervisor.best_mean_auroc();
        summary.final_model = Some(final_model);
        Ok(summary)
    }

    /// Export the trained model once, after the last epoch.
    pub fn save_final_model(
        &self,
        model: &impl Checkpointable,
    ) -> Result<PathBuf, CheckpointError> {
        save_model(model, &self.final_model_path, self.save_final_weights_only)?;
        Ok(self.final_model_path.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    use burn::backend::NdArray;
    use burn::tensor::TensorData;

    use crate::checkpoint::SupervisorState;
    use crate::error::ModelError;
    use crate::training::model::{EpochLogs, TrainableModel};

    type TestBackend = NdArray;

    /// Per-epoch sign of each class head: `[true, false]` scores class 0 with
    /// the input and class 1 with its negation.
    struct ScriptedModel {
        schedule: Vec<[bool; 2]>,
        epoch: usize,
        fail_at: Option<usize>,
    }

    impl ScriptedModel {
        fn new(schedule: Vec<[bool; 2]>) -> Self {
            ScriptedModel {
                schedule,
                epoch: 0,
                fail_at: None,
            }
        }
    }

    impl Checkpointable for ScriptedModel {
        fn save(&self, path: &Path, weights_only: bool) -> Result<(), ModelError> {
            let kind = if weights_only { "weights" } else { "model" };
            fs::write(path, format!("{kind} after epoch {}", self.epoch + 1))?;
            Ok(())
        }
    }

    impl TrainableModel<TestBackend, 1> for ScriptedModel {
        fn predict(&self, inputs: Tensor<TestBackend, 1>) -> Vec<Tensor<TestBackend, 1>> {
            self.schedule[self.epoch]
                .iter()
                .map(|&up| if up { inputs.clone() } else { inputs.clone().neg() })
                .collect()
        }

        fn learning_rate(&self) -> f64 {
            1e-4
        }
    }

    impl Fit<TestBackend, 1> for ScriptedModel {
        fn fit_epoch(&mut self, epoch: usize) -> Result<EpochLogs, ModelError> {
            if self.fail_at == Some(epoch) {
                return Err("out of memory".into());
            }
            self.epoch = epoch;
            let mut logs = EpochLogs::new();
            logs.insert("val_loss".to_string(), 1.0 / (epoch + 1) as f64);
            Ok(logs)
        }
    }

    fn validation_set() -> Vec<SourceBatch<TestBackend, 1>> {
        let device = Default::default();
        let make = |x: [f32; 2], y: [f32; 2]| {
            let labels = Tensor::<TestBackend, 1>::from_data(TensorData::from(y.as_slice()), &device);
            SourceBatch::new(
                Tensor::<TestBackend, 1>::from_data(TensorData::from(x.as_slice()), &device),
                vec![labels.clone(), labels],
            )
        };
        vec![make([0.1, 0.9], [0.0, 1.0]), make([0.2, 0.8], [0.0, 1.0])]
    }

    fn config_in(dir: &Path, epochs: usize) -> AppConfig {
        let mut config = AppConfig::default();
        config.general.output_dir = dir.to_path_buf();
        config.train.epochs = epochs;
        config.train.batch_size = 2;
        config.supervisor.class_names = vec!["Edema".to_string(), "Mass".to_string()];
        config
    }

    #[test]
    fn test_run_promotes_best_epochs_only() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), 3);
        let mut trainer = Trainer::new(&config).unwrap();
        let mut supervisor = AurocSupervisor::from_config(&config, 4).unwrap();
        let mut model =
            ScriptedModel::new(vec![[true, false], [true, true], [false, false]]);

        let summary = trainer
            .run(&mut model, &mut supervisor, || validation_set().into_iter())
            .unwrap();

        assert_eq!(summary.epochs_run, 3);
        assert_eq!(summary.improved_epochs, vec![0, 1]);
        assert!(summary.failed_epochs.is_empty());
        assert_eq!(summary.best_mean_auroc, 1.0);

        let best = fs::read_to_string(dir.path().join("best_weights.mpk")).unwrap();
        assert_eq!(best, "weights after epoch 2");
        let audit = fs::read_to_string(dir.path().join("best_auroc.log")).unwrap();
        assert_eq!(audit.lines().count(), 2);
        assert!(audit.starts_with("(epoch#1) auroc: 0.5, lr: 0.0001"));

        let state = SupervisorState::load(&config.train_stats_file()).unwrap();
        assert_eq!(state.best_mean_auroc, 1.0);

        let final_model = fs::read_to_string(config.final_model_path()).unwrap();
        assert_eq!(final_model, "model after epoch 3");
        assert_eq!(summary.final_model, Some(config.final_model_path()));
    }

    #[test]
    fn test_run_survives_evaluation_failure() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), 2);
        let mut trainer = Trainer::new(&config).unwrap();
        let mut supervisor = AurocSupervisor::from_config(&config, 4).unwrap();
        let mut model = ScriptedModel::new(vec![[true, true], [true, true]]);

        let mut calls = 0;
        let summary = trainer
            .run(&mut model, &mut supervisor, || {
                calls += 1;
                let take = if calls == 1 { 1 } else { 2 };
                validation_set().into_iter().take(take)
            })
            .unwrap();

        assert_eq!(summary.epochs_run, 2);
        assert_eq!(summary.failed_epochs, vec![0]);
        assert_eq!(summary.improved_epochs, vec![1]);
        assert!(config.final_model_path().exists());
    }

    #[test]
    fn test_model_error_aborts_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), 3);
        let mut trainer = Trainer::new(&config).unwrap();
        let mut supervisor = AurocSupervisor::from_config(&config, 4).unwrap();
        let mut model = ScriptedModel::new(vec![[true, true]; 3]);
        model.fail_at = Some(1);

        let err = trainer
            .run(&mut model, &mut supervisor, || validation_set().into_iter())
            .unwrap_err();
        assert!(matches!(err, SupervisorError::Model(ref m) if m == "out of memory"));
        assert!(!config.final_model_path().exists());
    }

    #[test]
    fn test_periodic_checkpoint_runs_alongside() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path(), 4);
        config.checkpoint.enabled = true;
        config.checkpoint.period = 2;
        let mut trainer = Trainer::new(&config).unwrap();
        let mut supervisor = AurocSupervisor::from_config(&config, 4).unwrap();
        let mut model = ScriptedModel::new(vec![[true, true]; 4]);

        trainer
            .run(&mut model, &mut supervisor, || validation_set().into_iter())
            .unwrap();

        assert!(!dir.path().join("checkpoint.001.mpk").exists());
        assert!(dir.path().join("checkpoint.002.mpk").exists());
        assert!(dir.path().join("checkpoint.004.mpk").exists());
    }

    #[test]
    fn test_invalid_periodic_mode_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path(), 1);
        config.checkpoint.enabled = true;
        config.checkpoint.mode = "upward".to_string();
        assert!(matches!(
            Trainer::new(&config),
            Err(SupervisorError::Checkpoint(_))
        ));
    }
}
