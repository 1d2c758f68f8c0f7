//! Record types — consolidated wide records and their versioned envelopes.
//!
//! A [`WideRecord`] is the consolidator's output: one row per entity with
//! every mapped statistic, and *no* version metadata. Version assignment is
//! exclusively the writer's responsibility; a [`VersionedRecord`] is what the
//! store holds. Historical versions are never rewritten — retirement only
//! flips the lifecycle fields on the previously-current row.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Attribute payload: canonical field name → scraped value.
///
/// Values keep their JSON shape (numbers stay numbers, missing stays null)
/// so all four entity kinds share one storage representation.
pub type FieldMap = BTreeMap<String, serde_json::Value>;

// ─── WideRecord ──────────────────────────────────────────────────────────────

/// One consolidated entity row, pre-versioning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WideRecord {
  /// Business identity key (see [`crate::entity`]).
  pub entity_id: String,
  /// The team this record belongs to — the routing key for per-team
  /// progress assignment. For opponent views this is the allowing team's
  /// own name, already stripped of the upstream `vs ` prefix.
  pub team:      String,
  pub season:    String,
  pub fields:    FieldMap,
}

// ─── VersionedRecord ─────────────────────────────────────────────────────────

/// A stored row: a wide record plus its SCD Type-2 envelope.
///
/// Invariants (enforced by the writer and checked by the validator):
/// at most one current row per `entity_id`; the current row has
/// `valid_to = None`; non-current rows have `valid_to >= valid_from`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedRecord {
  pub entity_id:  String,
  pub team:       String,
  pub season:     String,
  /// The team's own progress when this version was written — the highest
  /// completed match index for *that team*, never a shared global value.
  pub gameweek:   u32,
  pub valid_from: NaiveDate,
  pub valid_to:   Option<NaiveDate>,
  pub is_current: bool,
  pub fields:     FieldMap,
}

impl VersionedRecord {
  pub fn is_historical(&self) -> bool { !self.is_current }
}
