//! Epoch-end evaluation: batch collection, AUROC scoring, the supervisor hook
//! and the trainer loop that drives it.

pub mod collector;
pub mod metrics;
pub mod model;
pub mod supervisor;
pub mod trainer;
