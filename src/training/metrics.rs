use std::cmp::Ordering;
use std::collections::HashSet;

use burn::prelude::*;

use crate::error::MetricError;

/// Area under the ROC curve for one class.
///
/// `labels` must contain exactly two distinct values; the larger one is the
/// positive class. Returns `None` when the statistic is undefined (one label
/// value only, more than two values, or no samples). Tied scores are grouped so
/// they contribute a trapezoid instead of a staircase step.
pub fn roc_auc_score(labels: &[f32], scores: &[f32]) -> Option<f64> {
    if labels.len() != scores.len() || labels.is_empty() {
        return None;
    }

    let mut distinct: Vec<f32> = Vec::with_capacity(2);
    for &label in labels {
        if !distinct.iter().any(|&d| d == label) {
            distinct.push(label);
            if distinct.len() > 2 {
                return None;
            }
        }
    }
    if distinct.len() != 2 {
        return None;
    }
    let positive = distinct[0].max(distinct[1]);

    // Sort by score descending
    let mut pairs: Vec<(f32, bool)> = scores
        .iter()
        .zip(labels)
        .map(|(&s, &l)| (s, l == positive))
        .collect();
    pairs.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

    let n_pos = pairs.iter().filter(|(_, p)| *p).count() as f64;
    let n_neg = pairs.len() as f64 - n_pos;

    let (mut tp, mut fp) = (0.0f64, 0.0f64);
    let mut area = 0.0;
    let mut i = 0;
    while i < pairs.len() {
        let score = pairs[i].0;
        let (tp_prev, fp_prev) = (tp, fp);
        while i < pairs.len() && pairs[i].0 == score {
            if pairs[i].1 {
                tp += 1.0;
            } else {
                fp += 1.0;
            }
            i += 1;
        }
        area += (fp - fp_prev) * (tp + tp_prev) / 2.0;
    }

    Some(area / (n_pos * n_neg))
}

/// Scores for one epoch, in class-position order.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochScores {
    pub per_class: Vec<f64>,
    /// Unweighted mean of `per_class`, substituted zeros included.
    pub mean: f64,
    /// Positions whose AUROC was undefined and replaced by 0.
    pub degenerate: Vec<usize>,
}

/// Arithmetic mean; 0 for an empty slice.
pub fn mean_score(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    scores.iter().sum::<f64>() / scores.len() as f64
}

/// Per-class AUROC scorer bound to a validated list of class names.
#[derive(Debug, Clone)]
pub struct MetricEvaluator {
    class_names: Vec<String>,
}

impl MetricEvaluator {
    pub fn new(class_names: Vec<String>) -> Result<Self, MetricError> {
        if class_names.is_empty() {
            return Err(MetricError::NoClasses);
        }
        let mut seen = HashSet::with_capacity(class_names.len());
        for (i, name) in class_names.iter().enumerate() {
            if name.trim().is_empty() {
                return Err(MetricError::BlankClassName(i));
            }
            if !seen.insert(name.as_str()) {
                return Err(MetricError::DuplicateClassName(name.clone()));
            }
        }
        Ok(MetricEvaluator { class_names })
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn class_count(&self) -> usize {
        self.class_names.len()
    }

    /// Position of a class name, if known.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.class_names.iter().position(|n| n == name)
    }

    /// Score every class independently and average the results.
    ///
    /// A class whose labels have no positive/negative contrast scores 0 and is
    /// reported in [`EpochScores::degenerate`]; the other classes are unaffected.
    pub fn score(
        &self,
        predictions: &[Vec<f32>],
        ground_truth: &[Vec<f32>],
    ) -> Result<EpochScores, MetricError> {
        let expected = self.class_count();
        if predictions.len() != expected {
            return Err(MetricError::HeadCount {
                what: "prediction",
                expected,
                found: predictions.len(),
            });
        }
        if ground_truth.len() != expected {
            return Err(MetricError::HeadCount {
                what: "label",
                expected,
                found: ground_truth.len(),
            });
        }

        let mut per_class = Vec::with_capacity(expected);
        let mut degenerate = Vec::new();
        for (class, (y_hat, y)) in predictions.iter().zip(ground_truth).enumerate() {
            if y_hat.len() != y.len() {
                return Err(MetricError::LengthMismatch {
                    class,
                    predictions: y_hat.len(),
                    labels: y.len(),
                });
            }
            match roc_auc_score(y, y_hat) {
                Some(score) => per_class.push(score),
                None => {
                    per_class.push(0.0);
                    degenerate.push(class);
                }
            }
        }

        let mean = mean_score(&per_class);
        Ok(EpochScores {
            per_class,
            mean,
            degenerate,
        })
    }

    /// Same as [`score`](Self::score), reading the values out of rank-1 tensors.
    pub fn score_tensors<B: Backend>(
        &self,
        predictions: Vec<Tensor<B, 1>>,
        ground_truth: Vec<Tensor<B, 1>>,
    ) -> Result<EpochScores, MetricError> {
        let predictions = predictions
            .into_iter()
            .map(tensor_values)
            .collect::<Result<Vec<_>, _>>()?;
        let ground_truth = ground_truth
            .into_iter()
            .map(tensor_values)
            .collect::<Result<Vec<_>, _>>()?;
        self.score(&predictions, &ground_truth)
    }
}

fn tensor_values<B: Backend>(tensor: Tensor<B, 1>) -> Result<Vec<f32>, MetricError> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| MetricError::TensorData(format!("{e:?}")))
}

/// Per-class AUROC history for the whole run, one entry per epoch.
#[derive(Debug, Clone, Default)]
pub struct ScoreHistory {
    class_names: Vec<String>,
    scores: Vec<Vec<f64>>,
}

impl ScoreHistory {
    pub fn new(class_names: &[String]) -> Self {
        ScoreHistory {
            class_names: class_names.to_vec(),
            scores: vec![Vec::new(); class_names.len()],
        }
    }

    /// Append one epoch. Extra or missing positions are ignored.
    pub fn record(&mut self, epoch: &EpochScores) {
        for (history, &score) in self.scores.iter_mut().zip(&epoch.per_class) {
            history.push(score);
        }
    }

    pub fn get(&self, class_name: &str) -> Option<&[f64]> {
        self.class_names
            .iter()
            .position(|n| n == class_name)
            .map(|i| self.scores[i].as_slice())
    }

    /// Number of epochs recorded.
    pub fn epochs(&self) -> usize {
        self.scores.first().map_or(0, Vec::len)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.class_names
            .iter()
            .map(String::as_str)
            .zip(self.scores.iter().map(Vec::as_slice))
    }
}
