use std::fmt;
use std::str::FromStr;

use crate::error::TrackerError;

/// Which way a metric has to move to count as an improvement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Direction {
    HigherIsBetter,
    LowerIsBetter,
}

impl Direction {
    /// Sentinel every real value beats.
    pub fn worst(self) -> f64 {
        match self {
            Direction::HigherIsBetter => f64::NEG_INFINITY,
            Direction::LowerIsBetter => f64::INFINITY,
        }
    }

    /// Strict comparison: `true` iff `candidate` is better than `reference`.
    /// NaN never beats anything.
    pub fn beats(self, candidate: f64, reference: f64) -> bool {
        match self {
            Direction::HigherIsBetter => candidate > reference,
            Direction::LowerIsBetter => candidate < reference,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::HigherIsBetter => f.write_str("max"),
            Direction::LowerIsBetter => f.write_str("min"),
        }
    }
}

/// Naming policy for metrics without an explicit direction.
///
/// Accuracy-like names (anything containing `acc`, or starting with
/// `fmeasure`) are maximized. Everything else is treated as an error or loss
/// and minimized.
pub fn direction_for_metric(name: &str) -> Direction {
    if name.contains("acc") || name.starts_with("fmeasure") {
        Direction::HigherIsBetter
    } else {
        Direction::LowerIsBetter
    }
}

/// Configured improvement mode, as written in config files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImprovementMode {
    Auto,
    Min,
    Max,
}

impl ImprovementMode {
    /// Resolve to a concrete direction; `Auto` defers to [`direction_for_metric`].
    pub fn resolve(self, metric_name: &str) -> Direction {
        match self {
            ImprovementMode::Auto => direction_for_metric(metric_name),
            ImprovementMode::Min => Direction::LowerIsBetter,
            ImprovementMode::Max => Direction::HigherIsBetter,
        }
    }
}

impl FromStr for ImprovementMode {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(ImprovementMode::Auto),
            "min" => Ok(ImprovementMode::Min),
            "max" => Ok(ImprovementMode::Max),
            other => Err(TrackerError::InvalidDirection(other.to_string())),
        }
    }
}

/// Running best value with a fixed comparison direction.
///
/// Deciding and updating are separate steps: [`is_improvement`](Self::is_improvement)
/// never mutates, [`commit`](Self::commit) does.
#[derive(Debug, Clone, PartialEq)]
pub struct BestStateTracker {
    direction: Direction,
    best: f64,
}

impl BestStateTracker {
    pub fn new(direction: Direction) -> Self {
        BestStateTracker {
            direction,
            best: direction.worst(),
        }
    }

    /// Seed from a previously recorded best (e.g. a restored snapshot).
    pub fn with_best(direction: Direction, best: f64) -> Self {
        BestStateTracker { direction, best }
    }

    /// Build from a config mode string (`auto`, `min`, `max`) and the metric it watches.
    pub fn from_mode(mode: &str, metric_name: &str) -> Result<Self, TrackerError> {
        let mode: ImprovementMode = mode.parse()?;
        Ok(Self::new(mode.resolve(metric_name)))
    }

    pub fn is_improvement(&self, candidate: f64) -> bool {
        self.direction.beats(candidate, self.best)
    }

    pub fn commit(&mut self, candidate: f64) {
        self.best = candidate;
    }

    pub fn best(&self) -> f64 {
        self.best
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }
}
