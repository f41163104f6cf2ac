use burn::prelude::*;

use crate::error::CollectError;
use crate::training::model::SourceBatch;

/// A fixed evaluation set assembled from `steps` consecutive source batches.
///
/// Every label head and the inputs share the same sample count along dim 0.
#[derive(Debug, Clone)]
pub struct EvaluationBatch<B: Backend, const D: usize> {
    pub inputs: Tensor<B, D>,
    pub labels: Vec<Tensor<B, 1>>,
    pub raw_inputs: Option<Tensor<B, D>>,
}

impl<B: Backend, const D: usize> EvaluationBatch<B, D> {
    pub fn sample_count(&self) -> usize {
        self.inputs.dims()[0]
    }

    pub fn class_count(&self) -> usize {
        self.labels.len()
    }
}

/// Pull exactly `steps` batches from `source` and concatenate them along the
/// sample axis.
///
/// Batches are consumed in the order the source yields them, so a deterministic
/// source produces the same evaluation set on every call. Nothing is returned
/// unless all `steps` pulls succeed and every batch carries `class_count` heads.
pub fn collect_batches<B, const D: usize, I>(
    source: &mut I,
    steps: usize,
    class_count: usize,
    include_raw: bool,
) -> Result<EvaluationBatch<B, D>, CollectError>
where
    B: Backend,
    I: Iterator<Item = SourceBatch<B, D>>,
{
    if steps == 0 {
        return Err(CollectError::InvalidRequest("steps must be >= 1"));
    }
    if class_count == 0 {
        return Err(CollectError::InvalidRequest("class_count must be >= 1"));
    }

    let mut batches_x = Vec::with_capacity(steps);
    let mut batches_x_raw = Vec::new();
    let mut batches_y: Vec<Vec<Tensor<B, 1>>> =
        (0..class_count).map(|_| Vec::with_capacity(steps)).collect();

    for step in 0..steps {
        let batch = source.next().ok_or(CollectError::SourceExhausted {
            pulled: step,
            steps,
        })?;

        if batch.labels.len() != class_count {
            return Err(CollectError::ShapeMismatch {
                step,
                expected: class_count,
                found: batch.labels.len(),
            });
        }

        let samples = batch.inputs.dims()[0];
        for (head, labels) in batch.labels.iter().enumerate() {
            let found = labels.dims()[0];
            if found != samples {
                return Err(CollectError::SampleMismatch {
                    step,
                    head,
                    inputs: samples,
                    labels: found,
                });
            }
        }

        if include_raw {
            let raw = batch
                .raw_inputs
                .ok_or(CollectError::MissingRawInputs { step })?;
            batches_x_raw.push(raw);
        }
        batches_x.push(batch.inputs);
        for (head, labels) in batch.labels.into_iter().enumerate() {
            batches_y[head].push(labels);
        }
    }

    Ok(EvaluationBatch {
        inputs: Tensor::cat(batches_x, 0),
        labels: batches_y
            .into_iter()
            .map(|head| Tensor::cat(head, 0))
            .collect(),
        raw_inputs: include_raw.then(|| Tensor::cat(batches_x_raw, 0)),
    })
}
