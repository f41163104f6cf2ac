use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::checkpoint::tracker::BestStateTracker;
use crate::error::CheckpointError;
use crate::training::model::{Checkpointable, EpochLogs};

/// Configuration for cadence-based checkpointing.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PeriodicCheckpointConfig {
    pub enabled: bool,
    /// Output path template. Supports `{epoch}` (1-based, e.g. `{epoch:03}`)
    /// and any epoch log key (e.g. `{val_loss:.4f}`).
    pub filepath: String,
    pub monitor: String,
    pub verbose: u8,
    pub save_best_only: bool,
    pub save_weights_only: bool,
    /// `auto`, `min` or `max`.
    pub mode: String,
    pub period: usize,
}

impl Default for PeriodicCheckpointConfig {
    fn default() -> Self {
        PeriodicCheckpointConfig {
            enabled: false,
            filepath: "checkpoint.{epoch:03}.mpk".to_string(),
            monitor: "val_loss".to_string(),
            verbose: 0,
            save_best_only: false,
            save_weights_only: false,
            mode: "auto".to_string(),
            period: 1,
        }
    }
}

/// Result of one call to [`PeriodicCheckpoint::on_epoch_end`].
#[derive(Debug, Clone, PartialEq)]
pub enum PeriodicOutcome {
    NotDue,
    Saved(PathBuf),
    NotImproved,
    MonitorMissing,
}

/// Saves the model every `period` epochs, optionally only when the monitored
/// log value beats every earlier one. Keeps its own best value, independent
/// of the AUROC tracker.
pub struct PeriodicCheckpoint {
    config: PeriodicCheckpointConfig,
    tracker: BestStateTracker,
    epochs_since_last_save: usize,
}

impl PeriodicCheckpoint {
    pub fn new(config: PeriodicCheckpointConfig) -> Result<Self, CheckpointError> {
        if config.period == 0 {
            return Err(CheckpointError::ZeroPeriod);
        }
        let tracker = BestStateTracker::from_mode(&config.mode, &config.monitor)?;
        Ok(PeriodicCheckpoint {
            config,
            tracker,
            epochs_since_last_save: 0,
        })
    }

    pub fn config(&self) -> &PeriodicCheckpointConfig {
        &self.config
    }

    pub fn best(&self) -> f64 {
        self.tracker.best()
    }

    /// Call once per finished epoch (`epoch` is 0-based).
    pub fn on_epoch_end(
        &mut self,
        epoch: usize,
        logs: &EpochLogs,
        model: &impl Checkpointable,
    ) -> Result<PeriodicOutcome, CheckpointError> {
        self.epochs_since_last_save += 1;
        if self.epochs_since_last_save < self.config.period {
            return Ok(PeriodicOutcome::NotDue);
        }
        self.epochs_since_last_save = 0;

        let path = PathBuf::from(format_checkpoint_path(&self.config.filepath, epoch + 1, logs)?);
        let monitor = self.config.monitor.as_str();

        if !self.config.save_best_only {
            if self.config.verbose > 0 {
                info!(epoch = epoch + 1, path = %path.display(), "saving model");
            }
            save_model(model, &path, self.config.save_weights_only)?;
            return Ok(PeriodicOutcome::Saved(path));
        }

        let Some(&current) = logs.get(monitor) else {
            warn!(monitor, "can save best model only with monitor available, skipping");
            return Ok(PeriodicOutcome::MonitorMissing);
        };

        if !self.tracker.is_improvement(current) {
            if self.config.verbose > 0 {
                info!(epoch = epoch + 1, monitor, "did not improve");
            }
            return Ok(PeriodicOutcome::NotImproved);
        }

        if self.config.verbose > 0 {
            info!(
                epoch = epoch + 1,
                monitor,
                from = self.tracker.best(),
                to = current,
                path = %path.display(),
                "improved, saving model"
            );
        }
        save_model(model, &path, self.config.save_weights_only)?;
        self.tracker.commit(current);
        Ok(PeriodicOutcome::Saved(path))
    }
}

/// Save `model` to `path`, creating the parent directory if needed.
pub fn save_model(
    model: &impl Checkpointable,
    path: &Path,
    weights_only: bool,
) -> Result<(), CheckpointError> {
    let save_err = |message: String| CheckpointError::ModelSave {
        path: path.to_path_buf(),
        message,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| save_err(e.to_string()))?;
    }
    model
        .save(path, weights_only)
        .map_err(|e| save_err(e.to_string()))?;
    debug!(path = %path.display(), weights_only, "model saved");
    Ok(())
}

/// Expand `{epoch}` and `{<log key>}` placeholders in a checkpoint path.
///
/// Integer specs (`{epoch:03}`, `{epoch:03d}`) pad the epoch; float specs
/// (`{val_loss:.4f}`) set the precision of log values.
pub fn format_checkpoint_path(
    template: &str,
    epoch: usize,
    logs: &EpochLogs,
) -> Result<String, CheckpointError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after
            .find('}')
            .ok_or_else(|| CheckpointError::PathTemplate(after.to_string()))?;
        let field = &after[..close];
        let (key, spec) = field.split_once(':').unwrap_or((field, ""));

        let rendered = if key == "epoch" {
            render_int(epoch, spec)
        } else {
            logs.get(key).and_then(|&v| render_float(v, spec))
        };
        out.push_str(&rendered.ok_or_else(|| CheckpointError::PathTemplate(field.to_string()))?);
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn render_int(value: usize, spec: &str) -> Option<String> {
    let spec = spec.strip_suffix('d').unwrap_or(spec);
    if spec.is_empty() {
        return Some(value.to_string());
    }
    let width: usize = spec.parse().ok()?;
    if spec.starts_with('0') {
        Some(format!("{value:0width$}"))
    } else {
        Some(format!("{value:width$}"))
    }
}

fn render_float(value: f64, spec: &str) -> Option<String> {
    let spec = spec.strip_suffix('f').unwrap_or(spec);
    if spec.is_empty() {
        return Some(value.to_string());
    }
    let precision: usize = spec.strip_prefix('.')?.parse().ok()?;
    Some(format!("{value:.precision$}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use crate::error::ModelError;

    #[derive(Default)]
    struct RecordingModel {
        saves: RefCell<Vec<(PathBuf, bool)>>,
    }

    impl Checkpointable for RecordingModel {
        fn save(&self, path: &Path, weights_only: bool) -> Result<(), ModelError> {
            fs::write(path, b"model")?;
            self.saves.borrow_mut().push((path.to_path_buf(), weights_only));
            Ok(())
        }
    }

    struct FailingModel;

    impl Checkpointable for FailingModel {
        fn save(&self, _path: &Path, _weights_only: bool) -> Result<(), ModelError> {
            Err("disk full".into())
        }
    }

    fn logs(pairs: &[(&str, f64)]) -> EpochLogs {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn config_in(dir: &Path) -> PeriodicCheckpointConfig {
        PeriodicCheckpointConfig {
            enabled: true,
            filepath: dir.join("ckpt.{epoch:02d}.mpk").to_string_lossy().into_owned(),
            ..Default::default()
        }
    }

    #[test]
    fn test_format_checkpoint_path() {
        let l = logs(&[("val_loss", 0.123456)]);
        assert_eq!(
            format_checkpoint_path("w.{epoch}.bin", 3, &l).unwrap(),
            "w.3.bin"
        );
        assert_eq!(
            format_checkpoint_path("w.{epoch:03}-{val_loss:.2f}.bin", 7, &l).unwrap(),
            "w.007-0.12.bin"
        );
        assert_eq!(format_checkpoint_path("plain.bin", 1, &l).unwrap(), "plain.bin");
    }

    #[test]
    fn test_format_checkpoint_path_errors() {
        let l = logs(&[]);
        let err = format_checkpoint_path("w.{loss}.bin", 1, &l).unwrap_err();
        assert!(matches!(err, CheckpointError::PathTemplate(ref k) if k == "loss"));
        assert!(format_checkpoint_path("w.{epoch", 1, &l).is_err());
        assert!(format_checkpoint_path("w.{epoch:zz}", 1, &l).is_err());
    }

    #[test]
    fn test_saves_every_period() {
        let dir = tempfile::tempdir().unwrap();
        let mut checkpoint = PeriodicCheckpoint::new(PeriodicCheckpointConfig {
            period: 2,
            ..config_in(dir.path())
        })
        .unwrap();
        let model = RecordingModel::default();
        let l = logs(&[]);

        assert_eq!(checkpoint.on_epoch_end(0, &l, &model).unwrap(), PeriodicOutcome::NotDue);
        assert_eq!(
            checkpoint.on_epoch_end(1, &l, &model).unwrap(),
            PeriodicOutcome::Saved(dir.path().join("ckpt.02.mpk"))
        );
        assert_eq!(checkpoint.on_epoch_end(2, &l, &model).unwrap(), PeriodicOutcome::NotDue);
        assert!(matches!(
            checkpoint.on_epoch_end(3, &l, &model).unwrap(),
            PeriodicOutcome::Saved(_)
        ));
        assert_eq!(model.saves.borrow().len(), 2);
        assert!(dir.path().join("ckpt.04.mpk").exists());
    }

    #[test]
    fn test_save_best_only_uses_monitor() {
        let dir = tempfile::tempdir().unwrap();
        let mut checkpoint = PeriodicCheckpoint::new(PeriodicCheckpointConfig {
            save_best_only: true,
            save_weights_only: true,
            ..config_in(dir.path())
        })
        .unwrap();
        let model = RecordingModel::default();

        let first = checkpoint
            .on_epoch_end(0, &logs(&[("val_loss", 0.5)]), &model)
            .unwrap();
        assert!(matches!(first, PeriodicOutcome::Saved(_)));
        assert_eq!(
            checkpoint
                .on_epoch_end(1, &logs(&[("val_loss", 0.6)]), &model)
                .unwrap(),
            PeriodicOutcome::NotImproved
        );
        assert!(matches!(
            checkpoint
                .on_epoch_end(2, &logs(&[("val_loss", 0.4)]), &model)
                .unwrap(),
            PeriodicOutcome::Saved(_)
        ));
        assert_eq!(checkpoint.best(), 0.4);

        let saves = model.saves.borrow();
        assert_eq!(saves.len(), 2);
        assert!(saves.iter().all(|(_, weights_only)| *weights_only));
    }

    #[test]
    fn test_missing_monitor_skips_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        let mut checkpoint = PeriodicCheckpoint::new(PeriodicCheckpointConfig {
            save_best_only: true,
            ..config_in(dir.path())
        })
        .unwrap();
        let model = RecordingModel::default();

        let outcome = checkpoint
            .on_epoch_end(0, &logs(&[("loss", 0.3)]), &model)
            .unwrap();
        assert_eq!(outcome, PeriodicOutcome::MonitorMissing);
        assert!(model.saves.borrow().is_empty());
    }

    #[test]
    fn test_accuracy_monitor_maximizes_in_auto_mode() {
        let dir = tempfile::tempdir().unwrap();
        let mut checkpoint = PeriodicCheckpoint::new(PeriodicCheckpointConfig {
            save_best_only: true,
            monitor: "val_acc".to_string(),
            ..config_in(dir.path())
        })
        .unwrap();
        let model = RecordingModel::default();

        checkpoint
            .on_epoch_end(0, &logs(&[("val_acc", 0.6)]), &model)
            .unwrap();
        assert_eq!(
            checkpoint
                .on_epoch_end(1, &logs(&[("val_acc", 0.5)]), &model)
                .unwrap(),
            PeriodicOutcome::NotImproved
        );
    }

    #[test]
    fn test_invalid_config_fails_at_construction() {
        let err = PeriodicCheckpoint::new(PeriodicCheckpointConfig {
            mode: "largest".to_string(),
            ..Default::default()
        })
        .err()
        .unwrap();
        assert!(matches!(err, CheckpointError::Tracker(_)));

        let err = PeriodicCheckpoint::new(PeriodicCheckpointConfig {
            period: 0,
            ..Default::default()
        })
        .err()
        .unwrap();
        assert!(matches!(err, CheckpointError::ZeroPeriod));
    }

    #[test]
    fn test_save_failure_keeps_previous_best() {
        let dir = tempfile::tempdir().unwrap();
        let mut checkpoint = PeriodicCheckpoint::new(PeriodicCheckpointConfig {
            save_best_only: true,
            ..config_in(dir.path())
        })
        .unwrap();

        let err = checkpoint
            .on_epoch_end(0, &logs(&[("val_loss", 0.5)]), &FailingModel)
            .unwrap_err();
        assert!(matches!(err, CheckpointError::ModelSave { ref message, .. } if message == "disk full"));
        assert_eq!(checkpoint.best(), f64::INFINITY);
    }

    #[test]
    fn test_save_model_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("final.mpk");
        save_model(&RecordingModel::default(), &path, false).unwrap();
        assert!(path.exists());
    }
}
