use std::collections::BTreeMap;
use std::path::Path;

use burn::prelude::*;

use crate::error::ModelError;

/// Metric values reported by one training epoch, keyed by name (`loss`, `val_loss`, ...).
pub type EpochLogs = BTreeMap<String, f64>;

/// One pull from a streaming source.
///
/// `labels` holds one rank-1 tensor per class head, each with one value per
/// sample in `inputs`. `raw_inputs` carries the unprocessed images when the
/// source was asked for them (used for activation-map visualization).
#[derive(Debug, Clone)]
pub struct SourceBatch<B: Backend, const D: usize> {
    pub inputs: Tensor<B, D>,
    pub labels: Vec<Tensor<B, 1>>,
    pub raw_inputs: Option<Tensor<B, D>>,
}

impl<B: Backend, const D: usize> SourceBatch<B, D> {
    pub fn new(inputs: Tensor<B, D>, labels: Vec<Tensor<B, 1>>) -> Self {
        SourceBatch {
            inputs,
            labels,
            raw_inputs: None,
        }
    }

    pub fn with_raw(mut self, raw_inputs: Tensor<B, D>) -> Self {
        self.raw_inputs = Some(raw_inputs);
        self
    }
}

/// Anything that can write itself to disk.
pub trait Checkpointable {
    /// Persist the model (or only its weights) to `path`, overwriting it.
    fn save(&self, path: &Path, weights_only: bool) -> Result<(), ModelError>;
}

/// Capabilities the supervisor needs from a model. Internals stay opaque.
pub trait TrainableModel<B: Backend, const D: usize>: Checkpointable {
    /// Run inference, returning one rank-1 score tensor per class head.
    fn predict(&self, inputs: Tensor<B, D>) -> Vec<Tensor<B, 1>>;

    /// Learning rate the optimizer is currently using.
    fn learning_rate(&self) -> f64;
}

/// A model the [`Trainer`](crate::training::trainer::Trainer) can drive one epoch at a time.
pub trait Fit<B: Backend, const D: usize>: TrainableModel<B, D> {
    /// Train for one epoch (`epoch` is 0-based) and report its metrics.
    fn fit_epoch(&mut self, epoch: usize) -> Result<EpochLogs, ModelError>;
}
