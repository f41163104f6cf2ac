mod manager;
mod periodic;
mod state;
mod tracker;

pub use manager::{audit_line, CheckpointManager, CheckpointPaths, EpochOutcome};
pub use periodic::{
    format_checkpoint_path, save_model, PeriodicCheckpoint, PeriodicCheckpointConfig,
    PeriodicOutcome,
};
pub use state::SupervisorState;
pub use tracker::{direction_for_metric, BestStateTracker, Direction, ImprovementMode};
