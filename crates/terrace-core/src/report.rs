//! Run, status, and validation report types.
//!
//! Reports are computed read models: serialisable, never authoritative.
//! Mapping issues accumulate here instead of failing a run — they are data
//! quality signals for offline registry maintenance.

use std::{
  collections::{BTreeMap, BTreeSet},
  fmt,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{entity::EntityKind, fixture::TeamProgress};

// ─── Mapping issues ──────────────────────────────────────────────────────────

/// Columns a source table and its declared mapping disagreed about.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappingIssues {
  pub table:    String,
  /// Statistical columns present upstream but not declared — candidates for
  /// registry additions.
  pub unmapped: Vec<String>,
  /// Declared columns absent upstream — the source removed or renamed them.
  pub missing:  Vec<String>,
}

impl MappingIssues {
  pub fn is_clean(&self) -> bool {
    self.unmapped.is_empty() && self.missing.is_empty()
  }
}

// ─── Invariant violations ────────────────────────────────────────────────────

/// Bounds for the post-write row-count sanity check, per table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationLimits {
  pub players:   (u64, u64),
  pub keepers:   (u64, u64),
  pub squads:    (u64, u64),
  pub opponents: (u64, u64),
}

impl ValidationLimits {
  pub fn range(&self, kind: EntityKind) -> (u64, u64) {
    match kind {
      EntityKind::Outfield => self.players,
      EntityKind::Goalkeeper => self.keepers,
      EntityKind::Squad => self.squads,
      EntityKind::Opponent => self.opponents,
    }
  }
}

impl Default for ValidationLimits {
  fn default() -> Self {
    // A 20-team league: squads and opponent views are exactly league-sized,
    // player tables scale with squad depth.
    Self {
      players:   (200, 1200),
      keepers:   (20, 120),
      squads:    (10, 40),
      opponents: (10, 40),
    }
  }
}

/// A single post-write invariant failure. Any violation is fatal for the
/// run; committed historical rows are unaffected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "violation", rename_all = "snake_case")]
pub enum InvariantViolation {
  /// More than one `is_current` row for one business identity.
  DuplicateCurrent {
    kind:      EntityKind,
    entity_id: String,
    rows:      u64,
  },
  /// A current row's gameweek disagrees with the team's recorded progress.
  ProgressMismatch {
    kind:     EntityKind,
    team:     String,
    expected: u32,
    found:    u32,
  },
  /// Current-row count outside the configured sane range.
  RowCountOutOfRange {
    kind:  EntityKind,
    count: u64,
    min:   u64,
    max:   u64,
  },
  /// A historical row with `valid_to` before `valid_from`.
  ValidityInverted {
    kind:      EntityKind,
    entity_id: String,
  },
}

impl fmt::Display for InvariantViolation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::DuplicateCurrent { kind, entity_id, rows } => write!(
        f,
        "{}: {rows} current rows for {entity_id:?}",
        kind.table()
      ),
      Self::ProgressMismatch { kind, team, expected, found } => write!(
        f,
        "{}: current rows for {team:?} at gameweek {found}, expected {expected}",
        kind.table()
      ),
      Self::RowCountOutOfRange { kind, count, min, max } => write!(
        f,
        "{}: {count} current rows outside sane range {min}..={max}",
        kind.table()
      ),
      Self::ValidityInverted { kind, entity_id } => write!(
        f,
        "{}: valid_to precedes valid_from for {entity_id:?}",
        kind.table()
      ),
    }
  }
}

// ─── Run report ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
  /// Writes applied and validated.
  Succeeded,
  /// Nothing stale — the expected steady state.
  NoOp,
  Failed { message: String },
}

/// The record of one sync invocation, persisted in the run log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
  pub run_id:             Uuid,
  pub started_at:         DateTime<Utc>,
  pub finished_at:        Option<DateTime<Utc>>,
  pub outcome:            RunOutcome,
  /// Why a full upstream re-fetch ran, when one did.
  pub escalated:          Option<String>,
  pub season:             Option<String>,
  pub teams_updated:      BTreeSet<String>,
  /// Table name → rows inserted as current this run.
  pub records_written:    BTreeMap<String, u64>,
  /// Table name → rows retired to history this run.
  pub records_retired:    BTreeMap<String, u64>,
  /// Table name → duplicate source rows dropped during consolidation.
  pub duplicates_dropped: BTreeMap<String, u64>,
  pub mapping_issues:     Vec<MappingIssues>,
  pub violations:         Vec<InvariantViolation>,
}

impl RunReport {
  pub fn begin(now: DateTime<Utc>) -> Self {
    Self {
      run_id:             Uuid::new_v4(),
      started_at:         now,
      finished_at:        None,
      outcome:            RunOutcome::NoOp,
      escalated:          None,
      season:             None,
      teams_updated:      BTreeSet::new(),
      records_written:    BTreeMap::new(),
      records_retired:    BTreeMap::new(),
      duplicates_dropped: BTreeMap::new(),
      mapping_issues:     Vec::new(),
      violations:         Vec::new(),
    }
  }

  pub fn total_written(&self) -> u64 {
    self.records_written.values().sum()
  }
}

// ─── Status report ───────────────────────────────────────────────────────────

/// Per-table snapshot for the status query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableStatus {
  pub current_rows: u64,
  pub total_rows:   u64,
  /// Current-row progress per team — the progress distribution.
  pub progress:     TeamProgress,
}

/// The answer to the operational `status` query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
  /// Table name → status, for the four versioned tables.
  pub tables:     BTreeMap<String, TableStatus>,
  pub fixtures:   u64,
  pub latest_run: Option<RunReport>,
}
