//! SQL schema for the Terrace SQLite store.
//!
//! Executed once at connection startup. The four versioned tables share one
//! shape; their differing attribute sets live in the `fields` JSON column,
//! so the schema is fixed per run regardless of what the registry maps.

use strum::IntoEnumIterator;
use terrace_core::entity::EntityKind;

const HEADER: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
";

/// DDL for one versioned entity table. History is append-only: the only
/// UPDATE ever issued sets `valid_to`/`is_current` on retirement, inside the
/// same transaction that inserts the replacement rows. The partial unique
/// index makes a second current row for an identity a constraint error, not
/// just a validation finding.
fn entity_table_ddl(table: &str) -> String {
  format!(
    "
CREATE TABLE IF NOT EXISTS {table} (
    row_id      INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_id   TEXT NOT NULL,
    team        TEXT NOT NULL,
    season      TEXT NOT NULL,
    gameweek    INTEGER NOT NULL,
    valid_from  TEXT NOT NULL,    -- ISO 8601 date
    valid_to    TEXT,             -- NULL while current
    is_current  INTEGER NOT NULL DEFAULT 0,
    fields      TEXT NOT NULL     -- JSON payload of canonical columns
);

CREATE UNIQUE INDEX IF NOT EXISTS {table}_one_current
    ON {table}(entity_id) WHERE is_current = 1;
CREATE INDEX IF NOT EXISTS {table}_team_current_idx
    ON {table}(team, is_current);
CREATE INDEX IF NOT EXISTS {table}_entity_idx
    ON {table}(entity_id);
CREATE INDEX IF NOT EXISTS {table}_gameweek_idx
    ON {table}(gameweek);
"
  )
}

const FIXTURES_DDL: &str = "
-- Fixtures are naturally versioned by gameweek; the season's list is
-- replaced wholesale on refresh instead of carrying an SCD envelope.
CREATE TABLE IF NOT EXISTS fixtures (
    season       TEXT NOT NULL,
    gameweek     INTEGER NOT NULL,
    match_date   TEXT,
    home_team    TEXT NOT NULL,
    away_team    TEXT NOT NULL,
    home_score   INTEGER,
    away_score   INTEGER,
    home_xg      REAL,
    away_xg      REAL,
    is_completed INTEGER NOT NULL,
    analysis     TEXT NOT NULL    -- JSON of derived match analysis
);

CREATE INDEX IF NOT EXISTS fixtures_season_idx   ON fixtures(season);
CREATE INDEX IF NOT EXISTS fixtures_gameweek_idx ON fixtures(gameweek);
CREATE INDEX IF NOT EXISTS fixtures_teams_idx    ON fixtures(home_team, away_team);
";

const RUNS_DDL: &str = "
CREATE TABLE IF NOT EXISTS sync_runs (
    run_id     TEXT PRIMARY KEY,
    started_at TEXT NOT NULL,
    report     TEXT NOT NULL     -- full run report JSON
);

CREATE INDEX IF NOT EXISTS sync_runs_started_idx ON sync_runs(started_at);
";

const FOOTER: &str = "
PRAGMA user_version = 1;
";

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub fn schema() -> String {
  let mut ddl = String::from(HEADER);
  for kind in EntityKind::iter() {
    ddl.push_str(&entity_table_ddl(kind.table()));
  }
  ddl.push_str(FIXTURES_DDL);
  ddl.push_str(RUNS_DDL);
  ddl.push_str(FOOTER);
  ddl
}
