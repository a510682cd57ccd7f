//! Refresh pipeline: reads event windows, runs the pattern computations,
//! and swaps the derived tables, either once on demand or continuously on
//! per-pattern cadences.

pub mod orchestrator;
pub mod refresh;

pub use orchestrator::{Orchestrator, OrchestratorHandle};
pub use refresh::{RefreshEngine, RefreshError, RefreshReport};
