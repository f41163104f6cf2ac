use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::checkpoint::state::SupervisorState;
use crate::checkpoint::tracker::{BestStateTracker, Direction};
use crate::error::CheckpointError;

/// File locations derived from the "latest" weights file.
///
/// All artifacts live next to the weights: `best_<weights file name>`,
/// `best_auroc.log` and `.training_stats.json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointPaths {
    pub latest_weights: PathBuf,
    pub best_weights: PathBuf,
    pub audit_log: PathBuf,
    pub stats: PathBuf,
}

impl CheckpointPaths {
    pub fn from_weights_path(weights_path: &Path) -> Result<Self, CheckpointError> {
        let file_name = weights_path
            .file_name()
            .ok_or_else(|| CheckpointError::InvalidWeightsPath(weights_path.to_path_buf()))?;
        let dir = weights_path.parent().unwrap_or_else(|| Path::new(""));

        let mut best_name = std::ffi::OsString::from("best_");
        best_name.push(file_name);

        Ok(CheckpointPaths {
            latest_weights: weights_path.to_path_buf(),
            best_weights: dir.join(best_name),
            audit_log: dir.join("best_auroc.log"),
            stats: dir.join(".training_stats.json"),
        })
    }
}

/// What `on_epoch_end` decided for an epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EpochOutcome {
    Improved { previous: f64, current: f64 },
    NotImproved { best: f64 },
}

impl EpochOutcome {
    pub fn improved(&self) -> bool {
        matches!(self, EpochOutcome::Improved { .. })
    }
}

/// Promotes the latest weights to "best" whenever the mean AUROC improves, and
/// keeps the resumable snapshot in step with that promotion.
pub struct CheckpointManager {
    paths: CheckpointPaths,
    tracker: BestStateTracker,
    state: SupervisorState,
}

impl CheckpointManager {
    /// Start a fresh run: best is the worst possible score.
    pub fn new(paths: CheckpointPaths) -> Self {
        let tracker = BestStateTracker::new(Direction::HigherIsBetter);
        let state = SupervisorState::fresh(tracker.best());
        CheckpointManager {
            paths,
            tracker,
            state,
        }
    }

    /// Continue a previous run from its snapshot.
    pub fn resume(paths: CheckpointPaths, state: SupervisorState) -> Self {
        let tracker = BestStateTracker::with_best(Direction::HigherIsBetter, state.best_mean_auroc);
        CheckpointManager {
            paths,
            tracker,
            state,
        }
    }

    pub fn paths(&self) -> &CheckpointPaths {
        &self.paths
    }

    pub fn state(&self) -> &SupervisorState {
        &self.state
    }

    pub fn tracker(&self) -> &BestStateTracker {
        &self.tracker
    }

    pub fn is_improvement(&self, candidate: f64) -> bool {
        self.tracker.is_improvement(candidate)
    }

    /// Record one finished epoch (`epoch` is 0-based).
    ///
    /// On improvement, in order: copy latest -> best, append the audit line,
    /// overwrite the snapshot, commit the new best. A failure at any step
    /// returns early with nothing committed. Non-improving epochs touch no files.
    pub fn on_epoch_end(
        &mut self,
        epoch: usize,
        candidate: f64,
        learning_rate: f64,
    ) -> Result<EpochOutcome, CheckpointError> {
        self.state.lr = learning_rate;

        if !self.tracker.is_improvement(candidate) {
            return Ok(EpochOutcome::NotImproved {
                best: self.tracker.best(),
            });
        }

        let previous = self.tracker.best();
        info!(from = previous, to = candidate, "update best auroc");

        // 1. copy best model
        fs::copy(&self.paths.latest_weights, &self.paths.best_weights).map_err(|e| {
            CheckpointError::Copy {
                from: self.paths.latest_weights.clone(),
                to: self.paths.best_weights.clone(),
                source: e,
            }
        })?;
        debug!(
            from = %self.paths.latest_weights.display(),
            to = %self.paths.best_weights.display(),
            "copied best weights"
        );

        // 2. audit log
        self.append_audit_line(epoch, candidate, learning_rate)?;

        // 3. snapshot for resuming
        let next = SupervisorState {
            best_mean_auroc: candidate,
            ..self.state.clone()
        };
        next.save(&self.paths.stats)?;
        debug!(path = %self.paths.stats.display(), "wrote training stats");

        // 4. commit
        self.state = next;
        self.tracker.commit(candidate);

        Ok(EpochOutcome::Improved {
            previous,
            current: candidate,
        })
    }

    fn append_audit_line(
        &self,
        epoch: usize,
        auroc: f64,
        learning_rate: f64,
    ) -> Result<(), CheckpointError> {
        let log_err = |source| CheckpointError::AuditLog {
            path: self.paths.audit_log.clone(),
            source,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.paths.audit_log)
            .map_err(log_err)?;
        writeln!(file, "{}", audit_line(epoch, auroc, learning_rate)).map_err(log_err)?;
        Ok(())
    }
}

/// `(epoch#<N>) auroc: <score>, lr: <rate>` with a 1-based epoch number.
pub fn audit_line(epoch: usize, auroc: f64, learning_rate: f64) -> String {
    format!("(epoch#{}) auroc: {}, lr: {}", epoch + 1, auroc, learning_rate)
}
