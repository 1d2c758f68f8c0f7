//! The sync engine.
//!
//! One invocation is one batch: read the fixture ledger, plan, escalate at
//! most once, consolidate, write per team at that team's own progress,
//! rebuild fixtures, validate. Any fatal error aborts the whole run before
//! publishing — a half-applied batch is worse than a skipped one, and the
//! next scheduled run retries cleanly.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Duration, Utc};
use strum::IntoEnumIterator;
use terrace_core::{
  entity::EntityKind,
  fixture::{FixtureLedger, TeamProgress},
  record::WideRecord,
  report::{InvariantViolation, RunOutcome, RunReport, ValidationLimits},
  source::{SourceTable, StatSource},
  store::AnalyticsStore,
};
use terrace_ingest::Consolidator;
use tracing::{error, info, warn};

use crate::{
  Error, Result,
  planner::{self, Plan, PlannerInput},
};

// ─── Options and config ──────────────────────────────────────────────────────

/// Flags accepted by the "run sync" entry point.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
  /// Run a full upstream re-fetch before planning.
  pub force_refetch: bool,
  /// Rewrite every team the ledger knows, delta or not.
  pub force_rewrite: bool,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
  /// A source store older than this escalates to a full re-fetch.
  pub staleness_threshold: Duration,
  pub limits:              ValidationLimits,
  /// Pin the season explicitly instead of deriving it from fixture dates.
  pub season:              Option<String>,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      staleness_threshold: Duration::hours(24),
      limits:              ValidationLimits::default(),
      season:              None,
    }
  }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

pub struct SyncEngine<S, U> {
  store:        S,
  source:       U,
  consolidator: Consolidator,
  config:       SyncConfig,
}

impl<S, U> SyncEngine<S, U>
where
  S: AnalyticsStore,
  U: StatSource,
{
  pub fn new(store: S, source: U, config: SyncConfig) -> Self {
    Self { store, source, consolidator: Consolidator::new(), config }
  }

  pub fn store(&self) -> &S { &self.store }

  /// Run one sync batch and return its report. The report is recorded in
  /// the run log whether the run succeeds or fails.
  pub async fn run(&self, options: SyncOptions) -> Result<RunReport> {
    let mut report = RunReport::begin(Utc::now());
    info!(run_id = %report.run_id, "sync run starting");

    let result = self.run_inner(options, &mut report).await;
    report.finished_at = Some(Utc::now());
    if let Err(e) = &result {
      report.outcome = RunOutcome::Failed { message: e.to_string() };
      error!(run_id = %report.run_id, error = %e, "sync run failed");
    }

    if let Err(log_err) = self.store.record_run(report.clone()).await {
      warn!(error = %log_err, "failed to record run report");
    }

    result?;
    Ok(report)
  }

  /// Run the invariant checks standalone, against the current ledger.
  pub async fn validate(&self) -> Result<Vec<InvariantViolation>> {
    let ledger = self.ledger().await?;
    let season = self.season_of(&ledger);
    self
      .store
      .validate(season, ledger.team_progress(), self.config.limits)
      .await
      .map_err(Error::store)
  }

  async fn run_inner(
    &self,
    options: SyncOptions,
    report: &mut RunReport,
  ) -> Result<()> {
    if options.force_refetch {
      info!("forced upstream re-fetch");
      self.source.refresh().await.map_err(Error::source)?;
      report.escalated = Some("forced re-fetch".to_string());
    }

    let mut ledger = self.ledger().await?;
    let mut tables = self.fetch_tables().await?;

    let analytics_empty = self.store.is_empty().await.map_err(Error::store)?;
    let analytics_progress = self.analytics_progress().await?;

    // Re-query still-incomplete fixtures upstream: a completion that has
    // not landed locally means the source store is behind its origin.
    let newly_completed = if options.force_refetch {
      false
    } else {
      self.upstream_completed_any(&ledger).await?
    };

    let mut source_progress = ledger.team_progress();
    let mut plan = planner::plan(&PlannerInput {
      analytics_empty,
      source_progress: &source_progress,
      analytics_progress: &analytics_progress,
      newly_completed,
      tables_absent: absent_tables(&tables),
      source_age: self.source_age(options.force_refetch).await?,
      staleness_threshold: self.config.staleness_threshold,
    });

    // At most one escalation per run; the re-plan runs against fresh data
    // with both escalation triggers re-derived.
    if let Plan::Escalate(reason) = &plan {
      info!(reason = %reason, "escalating to full upstream re-fetch");
      report.escalated = Some(reason.to_string());
      self.source.refresh().await.map_err(Error::source)?;

      ledger = self.ledger().await?;
      tables = self.fetch_tables().await?;
      source_progress = ledger.team_progress();
      plan = planner::plan(&PlannerInput {
        analytics_empty,
        source_progress: &source_progress,
        analytics_progress: &analytics_progress,
        newly_completed: false,
        tables_absent: absent_tables(&tables),
        source_age: self.source_age(true).await?,
        staleness_threshold: self.config.staleness_threshold,
      });
      if let Plan::Escalate(reason) = &plan {
        warn!(reason = %reason, "re-fetch did not surface new data, stopping");
        plan = Plan::Noop;
      }
    }

    let selected: BTreeSet<String> = if options.force_rewrite {
      source_progress.keys().cloned().collect()
    } else {
      plan.selected_teams()
    };

    if selected.is_empty() {
      info!("all teams current, nothing to write");
      report.outcome = RunOutcome::NoOp;
      return Ok(());
    }
    info!(teams = selected.len(), "teams selected for refresh");

    // Consolidate every role once; writes below pick per-team slices.
    let season = self.season_of(&ledger);
    report.season = Some(season.clone());
    let consolidated = self.consolidator.consolidate_all(&tables, &season)?;
    report.mapping_issues = consolidated.issues.clone();
    report.duplicates_dropped = consolidated.duplicates_dropped.clone();

    let today = Utc::now().date_naive();
    for kind in EntityKind::iter() {
      let records = consolidated
        .records
        .get(&kind)
        .cloned()
        .unwrap_or_default();
      let mut by_team: BTreeMap<String, Vec<WideRecord>> = BTreeMap::new();
      for record in records {
        by_team.entry(record.team.clone()).or_default().push(record);
      }

      for team in &selected {
        let Some(team_records) = by_team.remove(team) else {
          warn!(team = %team, table = kind.table(), "no consolidated records for selected team");
          continue;
        };
        // Every selected team came out of the completed-fixture ledger, so
        // a missing progress entry would be an engine bug, not bad data.
        let Some(&gameweek) = source_progress.get(team) else {
          warn!(team = %team, "selected team has no completed fixtures, skipping");
          continue;
        };

        let outcome = self
          .store
          .retire_and_insert(
            kind,
            team.clone(),
            gameweek,
            today,
            team_records,
          )
          .await
          .map_err(Error::store)?;

        let table = kind.table().to_string();
        *report.records_written.entry(table.clone()).or_insert(0) +=
          outcome.inserted;
        *report.records_retired.entry(table).or_insert(0) += outcome.retired;
      }
    }
    report.teams_updated = selected;

    let fixture_count = self
      .store
      .replace_fixtures(season.clone(), ledger.fixtures().to_vec())
      .await
      .map_err(Error::store)?;
    info!(fixtures = fixture_count, season = %season, "fixtures rebuilt");

    let violations = self
      .store
      .validate(season, source_progress, self.config.limits)
      .await
      .map_err(Error::store)?;
    if !violations.is_empty() {
      for violation in &violations {
        error!(violation = %violation, "invariant violation");
      }
      let count = violations.len();
      report.violations = violations;
      return Err(Error::InvariantViolations(count));
    }

    report.outcome = RunOutcome::Succeeded;
    info!(
      written = report.total_written(),
      teams = report.teams_updated.len(),
      "sync run complete"
    );
    Ok(())
  }

  // ── Helpers ───────────────────────────────────────────────────────────────

  async fn ledger(&self) -> Result<FixtureLedger> {
    let fixtures = self.source.fixtures().await.map_err(Error::source)?;
    let ledger = FixtureLedger::new(fixtures);
    if ledger.is_empty() {
      return Err(Error::NoFixtures);
    }
    Ok(ledger)
  }

  async fn fetch_tables(&self) -> Result<BTreeMap<String, SourceTable>> {
    let mut tables = BTreeMap::new();
    for name in Consolidator::required_tables() {
      if let Some(table) =
        self.source.table(&name).await.map_err(Error::source)?
      {
        tables.insert(name, table);
      }
    }
    Ok(tables)
  }

  /// Downstream progress per team: the max current-row gameweek across all
  /// four tables, so a partially-written earlier run still reads as ahead.
  async fn analytics_progress(&self) -> Result<TeamProgress> {
    let mut merged = TeamProgress::new();
    for kind in EntityKind::iter() {
      let progress =
        self.store.team_progress(kind).await.map_err(Error::store)?;
      for (team, gameweek) in progress {
        let entry = merged.entry(team).or_insert(gameweek);
        if gameweek > *entry {
          *entry = gameweek;
        }
      }
    }
    Ok(merged)
  }

  async fn upstream_completed_any(
    &self,
    ledger: &FixtureLedger,
  ) -> Result<bool> {
    let incomplete = ledger.incomplete();
    if incomplete.is_empty() {
      return Ok(false);
    }
    let rechecked = self
      .source
      .recheck_fixtures(&incomplete)
      .await
      .map_err(Error::source)?;
    Ok(rechecked.iter().any(|f| f.is_completed))
  }

  async fn source_age(&self, just_refreshed: bool) -> Result<Option<Duration>> {
    if just_refreshed {
      return Ok(None);
    }
    let last = self.source.last_refreshed().await.map_err(Error::source)?;
    Ok(last.map(|at| Utc::now() - at))
  }

  fn season_of(&self, ledger: &FixtureLedger) -> String {
    self
      .config
      .season
      .clone()
      .or_else(|| ledger.season())
      .unwrap_or_else(|| "unknown".to_string())
  }
}

/// Only base tables escalate when absent — consolidation cannot run without
/// them. A missing auxiliary table is skipped with a warning instead.
fn absent_tables(tables: &BTreeMap<String, SourceTable>) -> Vec<String> {
  Consolidator::base_tables()
    .into_iter()
    .filter(|name| !tables.contains_key(name))
    .collect()
}
