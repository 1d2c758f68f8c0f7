//! Integration tests for the sync engine against an in-memory store and a
//! scripted fake source.

use std::{
  collections::BTreeMap,
  sync::Mutex,
};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde_json::json;
use terrace_core::{
  entity::EntityKind,
  fixture::Fixture,
  report::{RunOutcome, ValidationLimits},
  source::{SourceRow, SourceTable, StatSource},
  store::AnalyticsStore,
};
use terrace_store_sqlite::SqliteStore;

use crate::{Error, SyncConfig, SyncEngine, SyncOptions};

// ─── Fake source ─────────────────────────────────────────────────────────────

#[derive(Default)]
struct FakeState {
  fixtures:       Vec<Fixture>,
  tables:         BTreeMap<String, SourceTable>,
  last_refreshed: Option<DateTime<Utc>>,
  /// Data the next `refresh()` lands, simulating the scraper catching up.
  pending:        Option<(Vec<Fixture>, BTreeMap<String, SourceTable>)>,
  fail_refresh:   bool,
  refresh_calls:  usize,
}

struct FakeSource(Mutex<FakeState>);

impl FakeSource {
  fn new(fixtures: Vec<Fixture>, tables: BTreeMap<String, SourceTable>) -> Self {
    Self(Mutex::new(FakeState {
      fixtures,
      tables,
      ..FakeState::default()
    }))
  }

  fn set_fixtures(&self, fixtures: Vec<Fixture>) {
    self.0.lock().unwrap().fixtures = fixtures;
  }

  fn set_pending(
    &self,
    fixtures: Vec<Fixture>,
    tables: BTreeMap<String, SourceTable>,
  ) {
    self.0.lock().unwrap().pending = Some((fixtures, tables));
  }

  fn set_last_refreshed(&self, at: DateTime<Utc>) {
    self.0.lock().unwrap().last_refreshed = Some(at);
  }

  fn set_fail_refresh(&self) {
    self.0.lock().unwrap().fail_refresh = true;
  }

  fn refresh_calls(&self) -> usize {
    self.0.lock().unwrap().refresh_calls
  }
}

impl StatSource for &FakeSource {
  type Error = std::io::Error;

  async fn fixtures(&self) -> Result<Vec<Fixture>, std::io::Error> {
    Ok(self.0.lock().unwrap().fixtures.clone())
  }

  async fn table(
    &self,
    name: &str,
  ) -> Result<Option<SourceTable>, std::io::Error> {
    Ok(self.0.lock().unwrap().tables.get(name).cloned())
  }

  async fn recheck_fixtures(
    &self,
    fixtures: &[Fixture],
  ) -> Result<Vec<Fixture>, std::io::Error> {
    // Upstream truth is whatever the next refresh would land.
    let state = self.0.lock().unwrap();
    let latest = state
      .pending
      .as_ref()
      .map(|(f, _)| f.clone())
      .unwrap_or_else(|| state.fixtures.clone());
    Ok(
      latest
        .into_iter()
        .filter(|candidate| {
          fixtures.iter().any(|f| {
            f.gameweek == candidate.gameweek
              && f.home_team == candidate.home_team
              && f.away_team == candidate.away_team
          })
        })
        .collect(),
    )
  }

  async fn refresh(&self) -> Result<(), std::io::Error> {
    let mut state = self.0.lock().unwrap();
    state.refresh_calls += 1;
    if state.fail_refresh {
      return Err(std::io::Error::other("scrape failed"));
    }
    if let Some((fixtures, tables)) = state.pending.take() {
      state.fixtures = fixtures;
      state.tables = tables;
    }
    state.last_refreshed = Some(Utc::now());
    Ok(())
  }

  async fn last_refreshed(
    &self,
  ) -> Result<Option<DateTime<Utc>>, std::io::Error> {
    Ok(self.0.lock().unwrap().last_refreshed)
  }
}

// ─── Fixtures and tables ─────────────────────────────────────────────────────

fn fixture(gameweek: u32, home: &str, away: &str, completed: bool) -> Fixture {
  Fixture {
    gameweek,
    match_date: NaiveDate::from_ymd_opt(2024, 8, 17),
    home_team: home.to_string(),
    away_team: away.to_string(),
    home_score: completed.then_some(1),
    away_score: completed.then_some(0),
    home_xg: None,
    away_xg: None,
    is_completed: completed,
  }
}

fn row(pairs: &[(&str, serde_json::Value)]) -> SourceRow {
  pairs
    .iter()
    .map(|(k, v)| (k.to_string(), v.clone()))
    .collect()
}

/// Base tables for the given teams: one outfield player and one goalkeeper
/// per team, one squad row, one opponent row.
fn base_tables(teams: &[&str]) -> BTreeMap<String, SourceTable> {
  let mut player_rows = Vec::new();
  let mut squad_rows = Vec::new();
  let mut opponent_rows = Vec::new();
  for team in teams {
    player_rows.push(row(&[
      ("Player", json!(format!("Forward {team}"))),
      ("Pos", json!("FW")),
      ("Squad", json!(team)),
      ("Born", json!(1998)),
      ("Performance Gls", json!(3)),
    ]));
    player_rows.push(row(&[
      ("Player", json!(format!("Keeper {team}"))),
      ("Pos", json!("GK")),
      ("Squad", json!(team)),
      ("Born", json!(1995)),
      ("Performance Gls", json!(0)),
    ]));
    squad_rows.push(row(&[
      ("Squad", json!(team)),
      ("Performance Gls", json!(9)),
    ]));
    opponent_rows.push(row(&[
      ("Squad", json!(format!("vs {team}"))),
      ("Performance Gls", json!(7)),
    ]));
  }

  let mut tables = BTreeMap::new();
  for (name, rows) in [
    ("player_standard", player_rows),
    ("squad_standard", squad_rows),
    ("opponent_standard", opponent_rows),
  ] {
    tables.insert(
      name.to_string(),
      SourceTable { name: name.to_string(), rows },
    );
  }
  tables
}

fn config() -> SyncConfig {
  SyncConfig {
    staleness_threshold: Duration::hours(24),
    limits: ValidationLimits {
      players:   (0, 1000),
      keepers:   (0, 1000),
      squads:    (0, 1000),
      opponents: (0, 1000),
    },
    season: None,
  }
}

async fn engine(
  source: &FakeSource,
) -> SyncEngine<SqliteStore, &FakeSource> {
  let store = SqliteStore::open_in_memory().await.unwrap();
  SyncEngine::new(store, source, config())
}

// ─── Runs ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn bootstrap_writes_every_team_at_its_own_progress() {
  let source = FakeSource::new(
    vec![
      fixture(1, "Arsenal", "Fulham", true),
      fixture(2, "Arsenal", "Chelsea", false),
    ],
    base_tables(&["Arsenal", "Fulham", "Chelsea"]),
  );
  let engine = engine(&source).await;

  let report = engine.run(SyncOptions::default()).await.unwrap();
  assert_eq!(report.outcome, RunOutcome::Succeeded);
  assert_eq!(report.season.as_deref(), Some("2024-2025"));

  // Chelsea has no completed fixture: absent from the ledger, not written.
  assert_eq!(report.teams_updated.len(), 2);
  assert!(!report.teams_updated.contains("Chelsea"));

  let progress = engine
    .store()
    .team_progress(EntityKind::Squad)
    .await
    .unwrap();
  assert_eq!(progress.get("Arsenal"), Some(&1));
  assert_eq!(progress.get("Fulham"), Some(&1));
  assert!(!progress.contains_key("Chelsea"));

  // One outfield player and one keeper per written team.
  assert_eq!(report.records_written["players"], 2);
  assert_eq!(report.records_written["keepers"], 2);
  assert_eq!(report.records_written["opponents"], 2);

  let latest = engine.store().latest_run().await.unwrap().unwrap();
  assert_eq!(latest.run_id, report.run_id);
}

#[tokio::test]
async fn rerun_without_new_fixtures_is_a_noop() {
  let source = FakeSource::new(
    vec![fixture(1, "Arsenal", "Fulham", true)],
    base_tables(&["Arsenal", "Fulham"]),
  );
  let engine = engine(&source).await;

  engine.run(SyncOptions::default()).await.unwrap();
  let report = engine.run(SyncOptions::default()).await.unwrap();

  assert_eq!(report.outcome, RunOutcome::NoOp);
  assert_eq!(report.total_written(), 0);
  assert!(report.teams_updated.is_empty());
}

#[tokio::test]
async fn only_teams_with_new_fixtures_are_rewritten() {
  let teams = ["Arsenal", "Fulham", "Chelsea", "Everton"];
  let source = FakeSource::new(
    vec![
      fixture(1, "Arsenal", "Fulham", true),
      fixture(1, "Chelsea", "Everton", true),
    ],
    base_tables(&teams),
  );
  let engine = engine(&source).await;
  engine.run(SyncOptions::default()).await.unwrap();

  // A second round lands for Arsenal and Chelsea only.
  source.set_fixtures(vec![
    fixture(1, "Arsenal", "Fulham", true),
    fixture(1, "Chelsea", "Everton", true),
    fixture(2, "Arsenal", "Chelsea", true),
  ]);
  let report = engine.run(SyncOptions::default()).await.unwrap();

  assert_eq!(report.outcome, RunOutcome::Succeeded);
  assert_eq!(
    report.teams_updated,
    ["Arsenal", "Chelsea"]
      .into_iter()
      .map(String::from)
      .collect()
  );

  // Untouched teams keep their old current version at their old progress.
  let fulham = engine
    .store()
    .history(EntityKind::Squad, "Fulham_2024-2025".to_string())
    .await
    .unwrap();
  assert_eq!(fulham.len(), 1);
  assert!(fulham[0].is_current);
  assert_eq!(fulham[0].gameweek, 1);

  // Updated teams carry history and a new current version.
  let arsenal = engine
    .store()
    .history(EntityKind::Squad, "Arsenal_2024-2025".to_string())
    .await
    .unwrap();
  assert_eq!(arsenal.len(), 2);
  assert!(arsenal[0].is_historical());
  assert!(arsenal[1].is_current);
  assert_eq!(arsenal[1].gameweek, 2);
}

#[tokio::test]
async fn upstream_completion_escalates_then_applies_the_delta() {
  let initial = vec![
    fixture(1, "Arsenal", "Fulham", true),
    fixture(2, "Fulham", "Arsenal", false),
  ];
  let source =
    FakeSource::new(initial, base_tables(&["Arsenal", "Fulham"]));
  let engine = engine(&source).await;
  engine.run(SyncOptions::default()).await.unwrap();

  // The gameweek-2 result exists upstream but has not landed locally.
  source.set_pending(
    vec![
      fixture(1, "Arsenal", "Fulham", true),
      fixture(2, "Fulham", "Arsenal", true),
    ],
    base_tables(&["Arsenal", "Fulham"]),
  );

  let report = engine.run(SyncOptions::default()).await.unwrap();
  assert_eq!(report.outcome, RunOutcome::Succeeded);
  assert_eq!(
    report.escalated.as_deref(),
    Some("incomplete fixtures completed upstream")
  );
  assert_eq!(source.refresh_calls(), 1);

  let progress = engine
    .store()
    .team_progress(EntityKind::Squad)
    .await
    .unwrap();
  assert_eq!(progress.get("Arsenal"), Some(&2));
  assert_eq!(progress.get("Fulham"), Some(&2));
}

#[tokio::test]
async fn stale_source_escalates_even_when_quiet() {
  let source = FakeSource::new(
    vec![fixture(1, "Arsenal", "Fulham", true)],
    base_tables(&["Arsenal", "Fulham"]),
  );
  let engine = engine(&source).await;
  engine.run(SyncOptions::default()).await.unwrap();

  // Quiet week on the surface, but the source has not refreshed in 30h and
  // a re-fetch surfaces a new completed round.
  source.set_last_refreshed(Utc::now() - Duration::hours(30));
  source.set_pending(
    vec![
      fixture(1, "Arsenal", "Fulham", true),
      fixture(2, "Fulham", "Arsenal", true),
    ],
    base_tables(&["Arsenal", "Fulham"]),
  );

  let report = engine.run(SyncOptions::default()).await.unwrap();
  assert_eq!(report.outcome, RunOutcome::Succeeded);
  assert!(report.escalated.as_deref().unwrap().contains("30h"));

  let progress = engine
    .store()
    .team_progress(EntityKind::Squad)
    .await
    .unwrap();
  assert_eq!(progress.get("Arsenal"), Some(&2));
}

#[tokio::test]
async fn escalation_without_new_data_ends_as_noop() {
  let source = FakeSource::new(
    vec![fixture(1, "Arsenal", "Fulham", true)],
    base_tables(&["Arsenal", "Fulham"]),
  );
  let engine = engine(&source).await;
  engine.run(SyncOptions::default()).await.unwrap();

  source.set_last_refreshed(Utc::now() - Duration::hours(30));
  // No pending data: the re-fetch lands nothing new.
  let report = engine.run(SyncOptions::default()).await.unwrap();

  assert_eq!(report.outcome, RunOutcome::NoOp);
  assert_eq!(source.refresh_calls(), 1);
  assert_eq!(report.total_written(), 0);
}

#[tokio::test]
async fn refresh_failure_aborts_without_touching_current_rows() {
  let source = FakeSource::new(
    vec![fixture(1, "Arsenal", "Fulham", true)],
    base_tables(&["Arsenal", "Fulham"]),
  );
  let engine = engine(&source).await;
  engine.run(SyncOptions::default()).await.unwrap();

  source.set_last_refreshed(Utc::now() - Duration::hours(30));
  source.set_fail_refresh();

  let err = engine.run(SyncOptions::default()).await.unwrap_err();
  assert!(matches!(err, Error::Source(_)));

  // The previous current version is intact.
  let arsenal = engine
    .store()
    .history(EntityKind::Squad, "Arsenal_2024-2025".to_string())
    .await
    .unwrap();
  assert_eq!(arsenal.len(), 1);
  assert!(arsenal[0].is_current);

  // The failed run is still on the log.
  let latest = engine.store().latest_run().await.unwrap().unwrap();
  assert!(matches!(latest.outcome, RunOutcome::Failed { .. }));
}

#[tokio::test]
async fn force_rewrite_writes_a_new_version_for_every_team() {
  let source = FakeSource::new(
    vec![fixture(1, "Arsenal", "Fulham", true)],
    base_tables(&["Arsenal", "Fulham"]),
  );
  let engine = engine(&source).await;
  engine.run(SyncOptions::default()).await.unwrap();

  let report = engine
    .run(SyncOptions { force_rewrite: true, ..Default::default() })
    .await
    .unwrap();

  assert_eq!(report.outcome, RunOutcome::Succeeded);
  assert_eq!(report.teams_updated.len(), 2);

  // Progress does not move, but each team gains a version.
  let arsenal = engine
    .store()
    .history(EntityKind::Squad, "Arsenal_2024-2025".to_string())
    .await
    .unwrap();
  assert_eq!(arsenal.len(), 2);
  assert_eq!(arsenal[1].gameweek, 1);
}

#[tokio::test]
async fn standalone_validate_is_clean_after_a_run() {
  let source = FakeSource::new(
    vec![fixture(1, "Arsenal", "Fulham", true)],
    base_tables(&["Arsenal", "Fulham"]),
  );
  let engine = engine(&source).await;
  engine.run(SyncOptions::default()).await.unwrap();

  let violations = engine.validate().await.unwrap();
  assert!(violations.is_empty(), "{violations:?}");
}
