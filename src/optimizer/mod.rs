//! # Optimizer Module
//!
//! Sequencer del pipeline, separato in sottomoduli:
//! - `media_optimizer`: Orchestratore principale (sweep, enumerazione, pool)
//! - `task_optimizer`: Worker per singoli asset e macchina a stati
//! - `progress_tracker`: Aggregatore degli eventi di completamento

pub mod media_optimizer;
pub mod progress_tracker;
pub mod task_optimizer;

pub use media_optimizer::{MediaOptimizer, Stage};
pub use progress_tracker::ProgressTracker;
pub use task_optimizer::{AssetState, TaskOptimizer};
