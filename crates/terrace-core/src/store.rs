//! The `AnalyticsStore` trait.
//!
//! The trait is implemented by storage backends (e.g.
//! `terrace-store-sqlite`). Higher layers (`terrace-sync`, `terrace-api`)
//! depend on this abstraction, not on any concrete backend.
//!
//! Writes are append-only over history: the only mutation ever applied to an
//! existing row is retirement (set `valid_to`, clear `is_current`), and that
//! happens atomically with the insertion of the replacing version.

use std::future::Future;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
  entity::EntityKind,
  fixture::{Fixture, TeamProgress},
  record::{VersionedRecord, WideRecord},
  report::{InvariantViolation, RunReport, StatusReport, ValidationLimits},
};

// ─── Write outcome ───────────────────────────────────────────────────────────

/// Row counts from one team-table SCD write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteOutcome {
  pub retired:  u64,
  pub inserted: u64,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the versioned analytical store.
///
/// All methods return `Send` futures so the trait can be used from
/// multi-threaded async runtimes.
pub trait AnalyticsStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Reads ─────────────────────────────────────────────────────────────

  /// `true` when no versioned table holds any row — the bootstrap signal.
  fn is_empty(
    &self,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Current-row progress per team for one table.
  fn team_progress(
    &self,
    kind: EntityKind,
  ) -> impl Future<Output = Result<TeamProgress, Self::Error>> + Send + '_;

  /// All current rows, optionally restricted to one team.
  fn current_rows(
    &self,
    kind: EntityKind,
    team: Option<String>,
  ) -> impl Future<Output = Result<Vec<VersionedRecord>, Self::Error>> + Send + '_;

  /// Full version history for one business identity, oldest first.
  fn history(
    &self,
    kind: EntityKind,
    entity_id: String,
  ) -> impl Future<Output = Result<Vec<VersionedRecord>, Self::Error>> + Send + '_;

  // ── SCD write ─────────────────────────────────────────────────────────

  /// Retire `team`'s current rows and insert `records` as the new current
  /// version at `gameweek` — that team's own progress. Atomic per
  /// team-table pair: no reader may observe zero or two current rows for
  /// an identity. Teams other than `team` are untouched.
  fn retire_and_insert(
    &self,
    kind: EntityKind,
    team: String,
    gameweek: u32,
    today: NaiveDate,
    records: Vec<WideRecord>,
  ) -> impl Future<Output = Result<WriteOutcome, Self::Error>> + Send + '_;

  // ── Fixtures ──────────────────────────────────────────────────────────

  /// Replace the stored fixture list for one season. Fixtures are
  /// naturally versioned by gameweek and need no SCD envelope.
  fn replace_fixtures(
    &self,
    season: String,
    fixtures: Vec<Fixture>,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// The stored fixture list for one season, in gameweek order.
  fn fixtures(
    &self,
    season: String,
  ) -> impl Future<Output = Result<Vec<Fixture>, Self::Error>> + Send + '_;

  // ── Validation ────────────────────────────────────────────────────────

  /// Run the post-write invariant checks for one season against the
  /// expected per-team progress. An empty result means the store is sound.
  fn validate(
    &self,
    season: String,
    expected: TeamProgress,
    limits: ValidationLimits,
  ) -> impl Future<Output = Result<Vec<InvariantViolation>, Self::Error>> + Send + '_;

  // ── Run log ───────────────────────────────────────────────────────────

  /// Append a run report to the sync-run log.
  fn record_run(
    &self,
    report: RunReport,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn latest_run(
    &self,
  ) -> impl Future<Output = Result<Option<RunReport>, Self::Error>> + Send + '_;

  /// Per-table counts and progress distributions for the status query.
  fn status(
    &self,
  ) -> impl Future<Output = Result<StatusReport, Self::Error>> + Send + '_;
}
