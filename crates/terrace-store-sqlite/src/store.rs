//! [`SqliteStore`] — the SQLite implementation of [`AnalyticsStore`].

use std::{collections::BTreeMap, path::Path};

use chrono::NaiveDate;
use rusqlite::OptionalExtension as _;
use strum::IntoEnumIterator;

use terrace_core::{
  entity::EntityKind,
  fixture::{Fixture, TeamProgress},
  record::{VersionedRecord, WideRecord},
  report::{
    InvariantViolation, RunReport, StatusReport, TableStatus, ValidationLimits,
  },
  store::{AnalyticsStore, WriteOutcome},
};

use crate::{
  Error, Result,
  encode::{RawFixtureRow, RawVersionedRow, encode_date, encode_dt},
  schema::schema,
  validate::run_checks,
};

const RECORD_COLUMNS: &str =
  "entity_id, team, season, gameweek, valid_from, valid_to, is_current, fields";

fn read_record_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawVersionedRow> {
  Ok(RawVersionedRow {
    entity_id:  row.get(0)?,
    team:       row.get(1)?,
    season:     row.get(2)?,
    gameweek:   row.get(3)?,
    valid_from: row.get(4)?,
    valid_to:   row.get(5)?,
    is_current: row.get::<_, i64>(6)? != 0,
    fields:     row.get(7)?,
  })
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Terrace analytics store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    let ddl = schema();
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(&ddl)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── AnalyticsStore impl ─────────────────────────────────────────────────────

impl AnalyticsStore for SqliteStore {
  type Error = Error;

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn is_empty(&self) -> Result<bool> {
    let empty = self
      .conn
      .call(|conn| {
        for kind in EntityKind::iter() {
          let sql = format!("SELECT 1 FROM {} LIMIT 1", kind.table());
          let any: Option<i64> =
            conn.query_row(&sql, [], |row| row.get(0)).optional()?;
          if any.is_some() {
            return Ok(false);
          }
        }
        Ok(true)
      })
      .await?;
    Ok(empty)
  }

  async fn team_progress(&self, kind: EntityKind) -> Result<TeamProgress> {
    let table = kind.table();
    let rows: Vec<(String, i64)> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT team, MAX(gameweek) FROM {table}
           WHERE is_current = 1
           GROUP BY team"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(
      rows
        .into_iter()
        .map(|(team, gameweek)| (team, gameweek as u32))
        .collect(),
    )
  }

  async fn current_rows(
    &self,
    kind: EntityKind,
    team: Option<String>,
  ) -> Result<Vec<VersionedRecord>> {
    let table = kind.table();
    let raws: Vec<RawVersionedRow> = self
      .conn
      .call(move |conn| {
        let rows = if let Some(team) = team {
          let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM {table}
             WHERE is_current = 1 AND team = ?1
             ORDER BY entity_id"
          );
          let mut stmt = conn.prepare(&sql)?;
          stmt
            .query_map(rusqlite::params![team], read_record_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
          let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM {table}
             WHERE is_current = 1
             ORDER BY entity_id"
          );
          let mut stmt = conn.prepare(&sql)?;
          stmt
            .query_map([], read_record_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawVersionedRow::into_record).collect()
  }

  async fn history(
    &self,
    kind: EntityKind,
    entity_id: String,
  ) -> Result<Vec<VersionedRecord>> {
    let table = kind.table();
    let raws: Vec<RawVersionedRow> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {RECORD_COLUMNS} FROM {table}
           WHERE entity_id = ?1
           ORDER BY valid_from ASC, row_id ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![entity_id], read_record_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawVersionedRow::into_record).collect()
  }

  // ── SCD write ─────────────────────────────────────────────────────────────

  async fn retire_and_insert(
    &self,
    kind: EntityKind,
    team: String,
    gameweek: u32,
    today: NaiveDate,
    records: Vec<WideRecord>,
  ) -> Result<WriteOutcome> {
    let table = kind.table();
    let today_str = encode_date(today);
    let gameweek = gameweek as i64;

    let mut encoded = Vec::with_capacity(records.len());
    for record in records {
      let fields = serde_json::to_string(&record.fields)?;
      encoded.push((record.entity_id, record.team, record.season, fields));
    }

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let retired = tx.execute(
          &format!(
            "UPDATE {table}
             SET is_current = 0, valid_to = ?1
             WHERE team = ?2 AND is_current = 1"
          ),
          rusqlite::params![today_str, team],
        )?;

        let mut inserted = 0u64;
        {
          let mut stmt = tx.prepare(&format!(
            "INSERT INTO {table}
               (entity_id, team, season, gameweek,
                valid_from, valid_to, is_current, fields)
             VALUES (?1, ?2, ?3, ?4, ?5, NULL, 1, ?6)"
          ))?;
          for (entity_id, rec_team, season, fields) in &encoded {
            stmt.execute(rusqlite::params![
              entity_id, rec_team, season, gameweek, today_str, fields,
            ])?;
            inserted += 1;
          }
        }

        tx.commit()?;
        Ok(WriteOutcome { retired: retired as u64, inserted })
      })
      .await?;

    Ok(outcome)
  }

  // ── Fixtures ──────────────────────────────────────────────────────────────

  async fn replace_fixtures(
    &self,
    season: String,
    fixtures: Vec<Fixture>,
  ) -> Result<u64> {
    let mut encoded = Vec::with_capacity(fixtures.len());
    for f in &fixtures {
      let analysis = serde_json::to_string(&f.analysis())?;
      encoded.push((
        f.gameweek as i64,
        f.match_date.map(encode_date),
        f.home_team.clone(),
        f.away_team.clone(),
        f.home_score.map(|s| s as i64),
        f.away_score.map(|s| s as i64),
        f.home_xg,
        f.away_xg,
        f.is_completed as i64,
        analysis,
      ));
    }

    let inserted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "DELETE FROM fixtures WHERE season = ?1",
          rusqlite::params![season],
        )?;

        let mut inserted = 0u64;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO fixtures
               (season, gameweek, match_date, home_team, away_team,
                home_score, away_score, home_xg, away_xg,
                is_completed, analysis)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
          )?;
          for (
            gameweek,
            match_date,
            home_team,
            away_team,
            home_score,
            away_score,
            home_xg,
            away_xg,
            is_completed,
            analysis,
          ) in &encoded
          {
            stmt.execute(rusqlite::params![
              season,
              gameweek,
              match_date,
              home_team,
              away_team,
              home_score,
              away_score,
              home_xg,
              away_xg,
              is_completed,
              analysis,
            ])?;
            inserted += 1;
          }
        }

        tx.commit()?;
        Ok(inserted)
      })
      .await?;

    Ok(inserted)
  }

  async fn fixtures(&self, season: String) -> Result<Vec<Fixture>> {
    let raws: Vec<RawFixtureRow> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT gameweek, match_date, home_team, away_team,
                  home_score, away_score, home_xg, away_xg, is_completed
           FROM fixtures
           WHERE season = ?1
           ORDER BY gameweek ASC, match_date ASC",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![season], |row| {
            Ok(RawFixtureRow {
              gameweek:     row.get(0)?,
              match_date:   row.get(1)?,
              home_team:    row.get(2)?,
              away_team:    row.get(3)?,
              home_score:   row.get(4)?,
              away_score:   row.get(5)?,
              home_xg:      row.get(6)?,
              away_xg:      row.get(7)?,
              is_completed: row.get::<_, i64>(8)? != 0,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawFixtureRow::into_fixture).collect()
  }

  // ── Validation ────────────────────────────────────────────────────────────

  async fn validate(
    &self,
    season: String,
    expected: TeamProgress,
    limits: ValidationLimits,
  ) -> Result<Vec<InvariantViolation>> {
    let violations = self
      .conn
      .call(move |conn| {
        let violations = run_checks(conn, &season, &expected, limits)?;
        Ok(violations)
      })
      .await?;
    Ok(violations)
  }

  // ── Run log ───────────────────────────────────────────────────────────────

  async fn record_run(&self, report: RunReport) -> Result<()> {
    let run_id = report.run_id.to_string();
    let started_at = encode_dt(report.started_at);
    let body = serde_json::to_string(&report)?;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO sync_runs (run_id, started_at, report)
           VALUES (?1, ?2, ?3)",
          rusqlite::params![run_id, started_at, body],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn latest_run(&self) -> Result<Option<RunReport>> {
    let body: Option<String> = self
      .conn
      .call(|conn| {
        Ok(
          conn
            .query_row(
              "SELECT report FROM sync_runs
               ORDER BY started_at DESC LIMIT 1",
              [],
              |row| row.get(0),
            )
            .optional()?,
        )
      })
      .await?;

    body
      .map(|s| serde_json::from_str(&s))
      .transpose()
      .map_err(Error::Json)
  }

  async fn status(&self) -> Result<StatusReport> {
    let (tables, fixtures, latest) = self
      .conn
      .call(|conn| {
        let mut tables = BTreeMap::new();
        for kind in EntityKind::iter() {
          let table = kind.table();
          let current: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {table} WHERE is_current = 1"),
            [],
            |row| row.get(0),
          )?;
          let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {table}"),
            [],
            |row| row.get(0),
          )?;

          let sql = format!(
            "SELECT team, MAX(gameweek) FROM {table}
             WHERE is_current = 1
             GROUP BY team"
          );
          let mut stmt = conn.prepare(&sql)?;
          let progress: TeamProgress = stmt
            .query_map([], |row| {
              Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u32))
            })?
            .collect::<rusqlite::Result<_>>()?;

          tables.insert(
            table.to_string(),
            TableStatus {
              current_rows: current as u64,
              total_rows: total as u64,
              progress,
            },
          );
        }

        let fixtures: i64 =
          conn.query_row("SELECT COUNT(*) FROM fixtures", [], |row| row.get(0))?;
        let latest: Option<String> = conn
          .query_row(
            "SELECT report FROM sync_runs ORDER BY started_at DESC LIMIT 1",
            [],
            |row| row.get(0),
          )
          .optional()?;

        Ok((tables, fixtures, latest))
      })
      .await?;

    let latest_run = latest
      .map(|s| serde_json::from_str(&s))
      .transpose()
      .map_err(Error::Json)?;

    Ok(StatusReport { tables, fixtures: fixtures as u64, latest_run })
  }
}
