//! Post-write invariant checks.
//!
//! Runs inside the store's connection thread after a write batch. Violations
//! are findings, not panics — the sync engine treats any finding as fatal
//! for the run and refuses to publish, but committed historical rows stay
//! untouched.

use strum::IntoEnumIterator;
use terrace_core::{
  entity::EntityKind,
  fixture::TeamProgress,
  report::{InvariantViolation, ValidationLimits},
};

/// Execute every check against every versioned table.
pub(crate) fn run_checks(
  conn: &rusqlite::Connection,
  season: &str,
  expected: &TeamProgress,
  limits: ValidationLimits,
) -> rusqlite::Result<Vec<InvariantViolation>> {
  let mut violations = Vec::new();

  for kind in EntityKind::iter() {
    let table = kind.table();

    // One current row per business identity, across all seasons.
    let sql = format!(
      "SELECT entity_id, COUNT(*) FROM {table}
       WHERE is_current = 1
       GROUP BY entity_id
       HAVING COUNT(*) > 1"
    );
    let mut stmt = conn.prepare(&sql)?;
    let duplicates = stmt
      .query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    for (entity_id, rows) in duplicates {
      violations.push(InvariantViolation::DuplicateCurrent {
        kind,
        entity_id,
        rows: rows as u64,
      });
    }

    // Every current row in this season sits at its team's recorded
    // progress. Teams the ledger does not know about (no completed
    // fixture) are skipped rather than guessed at.
    let sql = format!(
      "SELECT DISTINCT team, gameweek FROM {table}
       WHERE is_current = 1 AND season = ?1"
    );
    let mut stmt = conn.prepare(&sql)?;
    let positions = stmt
      .query_map(rusqlite::params![season], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    for (team, found) in positions {
      if let Some(&want) = expected.get(&team)
        && want != found as u32
      {
        violations.push(InvariantViolation::ProgressMismatch {
          kind,
          team,
          expected: want,
          found: found as u32,
        });
      }
    }

    // Current-row count within the configured sane range.
    let sql = format!(
      "SELECT COUNT(*) FROM {table} WHERE is_current = 1 AND season = ?1"
    );
    let count: i64 =
      conn.query_row(&sql, rusqlite::params![season], |row| row.get(0))?;
    let (min, max) = limits.range(kind);
    let count = count as u64;
    if count < min || count > max {
      violations.push(InvariantViolation::RowCountOutOfRange {
        kind,
        count,
        min,
        max,
      });
    }

    // Retired rows must close after they opened.
    let sql = format!(
      "SELECT entity_id FROM {table}
       WHERE valid_to IS NOT NULL AND valid_to < valid_from"
    );
    let mut stmt = conn.prepare(&sql)?;
    let inverted = stmt
      .query_map([], |row| row.get::<_, String>(0))?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    for entity_id in inverted {
      violations.push(InvariantViolation::ValidityInverted { kind, entity_id });
    }
  }

  Ok(violations)
}
