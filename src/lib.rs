//! # AUROC Supervisor
//!
//! Epoch-end supervision for multi-label classifiers trained with Burn.
//! After each epoch the supervisor scores a fixed validation set, computes
//! per-class AUROC and their mean, and promotes the latest weights to "best"
//! when the mean improves. Progress is kept in a JSON snapshot so an
//! interrupted run can resume with the right baseline.
//!
//! ## Modules
//!
//! - [`training`] - Batch collection, AUROC scoring, the epoch-end hook and trainer loop
//! - [`checkpoint`] - Best-state tracking, best-weights promotion, periodic checkpoints
//! - [`config`] - TOML configuration loading and validation
//! - [`error`] - Structured error types

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod training;
