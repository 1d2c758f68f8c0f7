//! Encoding and decoding helpers between Rust domain types and the plain
//! representations stored in SQLite columns.
//!
//! Validity dates are stored as ISO 8601 date strings, instants as RFC 3339.
//! Attribute payloads and run reports are stored as compact JSON.

use chrono::{DateTime, NaiveDate, Utc};
use terrace_core::{
  fixture::Fixture,
  record::{FieldMap, VersionedRecord},
};

use crate::{Error, Result};

// ─── Dates ───────────────────────────────────────────────────────────────────

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from one versioned-table row.
pub struct RawVersionedRow {
  pub entity_id:  String,
  pub team:       String,
  pub season:     String,
  pub gameweek:   i64,
  pub valid_from: String,
  pub valid_to:   Option<String>,
  pub is_current: bool,
  pub fields:     String,
}

impl RawVersionedRow {
  pub fn into_record(self) -> Result<VersionedRecord> {
    let fields: FieldMap = serde_json::from_str(&self.fields)?;
    Ok(VersionedRecord {
      entity_id:  self.entity_id,
      team:       self.team,
      season:     self.season,
      gameweek:   self.gameweek as u32,
      valid_from: decode_date(&self.valid_from)?,
      valid_to:   self.valid_to.as_deref().map(decode_date).transpose()?,
      is_current: self.is_current,
      fields,
    })
  }
}

/// Raw values read directly from one fixtures row.
pub struct RawFixtureRow {
  pub gameweek:     i64,
  pub match_date:   Option<String>,
  pub home_team:    String,
  pub away_team:    String,
  pub home_score:   Option<i64>,
  pub away_score:   Option<i64>,
  pub home_xg:      Option<f64>,
  pub away_xg:      Option<f64>,
  pub is_completed: bool,
}

impl RawFixtureRow {
  pub fn into_fixture(self) -> Result<Fixture> {
    Ok(Fixture {
      gameweek:     self.gameweek as u32,
      match_date:   self.match_date.as_deref().map(decode_date).transpose()?,
      home_team:    self.home_team,
      away_team:    self.away_team,
      home_score:   self.home_score.map(|s| s as u32),
      away_score:   self.away_score.map(|s| s as u32),
      home_xg:      self.home_xg,
      away_xg:      self.away_xg,
      is_completed: self.is_completed,
    })
  }
}
