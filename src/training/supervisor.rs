use burn::prelude::*;
use tracing::{info, warn};

use crate::checkpoint::{CheckpointManager, CheckpointPaths, EpochOutcome, SupervisorState};
use crate::config::AppConfig;
use crate::error::{CollectError, SupervisorError};
use crate::training::collector::collect_batches;
use crate::training::metrics::{EpochScores, MetricEvaluator, ScoreHistory};
use crate::training::model::{SourceBatch, TrainableModel};

/// Everything decided at the end of one epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochReport {
    pub epoch: usize,
    pub learning_rate: f64,
    pub scores: EpochScores,
    pub outcome: EpochOutcome,
}

/// Epoch-end hook: evaluates a fixed validation set, scores per-class AUROC
/// and promotes the best weights.
pub struct AurocSupervisor {
    steps: usize,
    evaluator: MetricEvaluator,
    history: ScoreHistory,
    checkpoints: CheckpointManager,
}

impl AurocSupervisor {
    pub fn new(
        class_names: Vec<String>,
        steps: usize,
        checkpoints: CheckpointManager,
    ) -> Result<Self, SupervisorError> {
        if steps == 0 {
            return Err(CollectError::InvalidRequest("steps must be >= 1").into());
        }
        let evaluator = MetricEvaluator::new(class_names)?;
        let history = ScoreHistory::new(evaluator.class_names());
        Ok(AurocSupervisor {
            steps,
            evaluator,
            history,
            checkpoints,
        })
    }

    /// Build from configuration. In resume mode an existing snapshot seeds the
    /// best score; otherwise the run starts fresh.
    pub fn from_config(
        config: &AppConfig,
        validation_samples: usize,
    ) -> Result<Self, SupervisorError> {
        let steps = config
            .validation_steps()?
            .steps_for(validation_samples, config.train.batch_size);
        let paths = CheckpointPaths::from_weights_path(&config.weights_path())?;

        let checkpoints = if config.is_resume_mode() && paths.stats.exists() {
            let state = SupervisorState::load(&paths.stats)?;
            info!(
                best_mean_auroc = state.best_mean_auroc,
                lr = state.lr,
                "resuming from training stats"
            );
            CheckpointManager::resume(paths, state)
        } else {
            CheckpointManager::new(paths)
        };

        Self::new(config.supervisor.class_names.clone(), steps, checkpoints)
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn history(&self) -> &ScoreHistory {
        &self.history
    }

    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }

    pub fn best_mean_auroc(&self) -> f64 {
        self.checkpoints.tracker().best()
    }

    /// Run once per completed epoch (`epoch` is 0-based), after the latest
    /// weights have been written.
    pub fn on_epoch_end<B, const D: usize, M, I>(
        &mut self,
        epoch: usize,
        model: &M,
        source: &mut I,
    ) -> Result<EpochReport, SupervisorError>
    where
        B: Backend,
        M: TrainableModel<B, D>,
        I: Iterator<Item = SourceBatch<B, D>>,
    {
        let learning_rate = model.learning_rate();
        info!(epoch = epoch + 1, learning_rate, "current learning rate");

        let batch = collect_batches(source, self.steps, self.evaluator.class_count(), false)?;
        let predictions = model.predict(batch.inputs);
        let scores = self.evaluator.score_tensors(predictions, batch.labels)?;
        self.history.record(&scores);

        for (i, (name, auroc)) in self
            .evaluator
            .class_names()
            .iter()
            .zip(&scores.per_class)
            .enumerate()
        {
            info!(epoch = epoch + 1, class = %name, auroc, "{}. {}: {}", i + 1, name, auroc);
        }
        for &i in &scores.degenerate {
            warn!(
                class = %self.evaluator.class_names()[i],
                "auroc undefined for a single label value, scored as 0"
            );
        }
        info!(epoch = epoch + 1, mean_auroc = scores.mean, "mean auroc");

        let outcome = self
            .checkpoints
            .on_epoch_end(epoch, scores.mean, learning_rate)?;
        if let EpochOutcome::NotImproved { best } = outcome {
            info!(best_mean_auroc = best, "mean auroc did not improve");
        }

        Ok(EpochReport {
            epoch,
            learning_rate,
            scores,
            outcome,
        })
    }
}
