//! The Terrace sync engine.
//!
//! Composes the fixture ledger, the update planner, the consolidator, and a
//! versioned store into one "run sync" entry point. Generic over
//! [`terrace_core::store::AnalyticsStore`] and
//! [`terrace_core::source::StatSource`], so both sides are swappable in
//! tests.

pub mod engine;
pub mod error;
pub mod planner;
pub mod snapshot;

pub use engine::{SyncConfig, SyncEngine, SyncOptions};
pub use error::{Error, Result};
pub use planner::{EscalationReason, Plan, PlannerInput};
pub use snapshot::{SnapshotError, SnapshotSource};

#[cfg(test)]
mod tests;
