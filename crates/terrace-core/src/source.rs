//! The `StatSource` trait and input-boundary table types.
//!
//! The scraping collaborator lives outside this system; this is its entire
//! footprint here. It delivers one flat fixture list plus named source
//! tables, each a set of rows keyed by identity columns. No version metadata
//! crosses this boundary — version assignment belongs to the writer alone.

use std::{
  collections::{BTreeMap, BTreeSet},
  future::Future,
};

use chrono::{DateTime, Utc};

use crate::fixture::Fixture;

// ─── Source tables ───────────────────────────────────────────────────────────

/// One scraped row: raw column name → value, JSON-shaped.
pub type SourceRow = BTreeMap<String, serde_json::Value>;

/// A narrow source table as scraped upstream.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SourceTable {
  pub name: String,
  pub rows: Vec<SourceRow>,
}

impl SourceTable {
  /// The union of raw column names across all rows.
  pub fn columns(&self) -> BTreeSet<String> {
    self
      .rows
      .iter()
      .flat_map(|row| row.keys().cloned())
      .collect()
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the upstream source store populated by the scraper.
///
/// Reads are cheap and local. `refresh` is the expensive escalation path: a
/// full rate-limited re-scrape, sequential by design, which callers await
/// before planning continues — its result changes the refresh decision.
pub trait StatSource: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// The full scheduled fixture list with completion status.
  fn fixtures(
    &self,
  ) -> impl Future<Output = Result<Vec<Fixture>, Self::Error>> + Send + '_;

  /// A named source table; `None` when the table is entirely absent.
  fn table<'a>(
    &'a self,
    name: &'a str,
  ) -> impl Future<Output = Result<Option<SourceTable>, Self::Error>> + Send + 'a;

  /// Re-query just the given fixtures against the upstream origin and
  /// return their refreshed state. Used to detect fixtures that completed
  /// upstream before the local source store caught up.
  fn recheck_fixtures<'a>(
    &'a self,
    fixtures: &'a [Fixture],
  ) -> impl Future<Output = Result<Vec<Fixture>, Self::Error>> + Send + 'a;

  /// Full upstream re-fetch of every category. Slow; rate-limited by the
  /// collaborator. A failure here must abort the run without writing.
  fn refresh(
    &self,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// When the source store last completed a refresh, if known.
  fn last_refreshed(
    &self,
  ) -> impl Future<Output = Result<Option<DateTime<Utc>>, Self::Error>> + Send + '_;
}
