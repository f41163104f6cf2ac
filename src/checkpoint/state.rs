use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CheckpointError;

/// Resumable supervisor state, persisted as `.training_stats.json`.
///
/// `extra` holds any other scalar bookkeeping and is flattened into the same
/// JSON object, so older snapshots with only `best_mean_auroc` still load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupervisorState {
    pub best_mean_auroc: f64,
    #[serde(default)]
    pub lr: f64,
    #[serde(flatten)]
    pub extra: BTreeMap<String, f64>,
}

impl SupervisorState {
    /// Fresh state whose best score is the given sentinel.
    pub fn fresh(best_mean_auroc: f64) -> Self {
        SupervisorState {
            best_mean_auroc,
            lr: 0.0,
            extra: BTreeMap::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, CheckpointError> {
        let json = fs::read_to_string(path).map_err(|e| CheckpointError::StatsRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&json).map_err(|e| CheckpointError::StatsParse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Overwrite `path` with this state. Written to a sibling temp file first
    /// and renamed, so readers never observe a half-written snapshot.
    pub fn save(&self, path: &Path) -> Result<(), CheckpointError> {
        let json = serde_json::to_string(self)?;
        let mut tmp_name = path
            .file_name()
            .ok_or_else(|| CheckpointError::InvalidWeightsPath(path.to_path_buf()))?
            .to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = path.with_file_name(tmp_name);

        let write_err = |source| CheckpointError::StatsWrite {
            path: path.to_path_buf(),
            source,
        };
        fs::write(&tmp_path, json).map_err(write_err)?;
        fs::rename(&tmp_path, path).map_err(write_err)?;
        Ok(())
    }
}
