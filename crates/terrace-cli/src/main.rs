//! The `terrace` binary.
//!
//! Reads `config.toml` (or the path specified with `--config`), opens the
//! SQLite analytics store, and runs one of the operational commands:
//! `sync`, `status`, `validate`, or `serve`.
//!
//! Configuration keys (TOML, overridable via `TERRACE_`-prefixed
//! environment variables):
//!
//! ```toml
//! store_path   = "~/.local/share/terrace/analytics.db"
//! snapshot_dir = "~/.local/share/terrace/snapshot"
//! # The external scraper invocation used for full re-fetches.
//! refresh_command = ["python", "pipelines/raw_pipeline.py"]
//! refresh_timeout_minutes = 30
//! staleness_hours = 24
//! # season = "2024-2025"
//! host = "127.0.0.1"
//! port = 5410
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use terrace_api::ApiState;
use terrace_core::{
  report::{RunOutcome, RunReport, ValidationLimits},
  store::AnalyticsStore,
};
use terrace_store_sqlite::SqliteStore;
use terrace_sync::{SnapshotSource, SyncConfig, SyncEngine, SyncOptions};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI ─────────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(author, version, about = "Terrace analytics store sync")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Run one incremental sync batch.
  Sync {
    /// Run a full upstream re-fetch before planning.
    #[arg(long)]
    force_refetch: bool,
    /// Rewrite every team whether or not it is stale.
    #[arg(long)]
    force_rewrite: bool,
  },
  /// Per-table current-row counts and progress distributions.
  Status,
  /// Run the invariant checks without writing.
  Validate,
  /// Serve the read-only JSON API.
  Serve,
}

// ─── Configuration ───────────────────────────────────────────────────────────

fn default_refresh_timeout_minutes() -> u64 { 30 }
fn default_staleness_hours() -> i64 { 24 }
fn default_host() -> String { "127.0.0.1".to_string() }
fn default_port() -> u16 { 5410 }

#[derive(Deserialize, Clone)]
struct AppConfig {
  store_path:   PathBuf,
  snapshot_dir: PathBuf,
  #[serde(default)]
  refresh_command: Option<Vec<String>>,
  #[serde(default = "default_refresh_timeout_minutes")]
  refresh_timeout_minutes: u64,
  #[serde(default = "default_staleness_hours")]
  staleness_hours: i64,
  #[serde(default)]
  season: Option<String>,
  #[serde(default)]
  limits: Option<ValidationLimits>,
  #[serde(default = "default_host")]
  host: String,
  #[serde(default = "default_port")]
  port: u16,
}

impl AppConfig {
  fn sync_config(&self) -> SyncConfig {
    SyncConfig {
      staleness_threshold: chrono::Duration::hours(self.staleness_hours),
      limits:              self.limits.unwrap_or_default(),
      season:              self.season.clone(),
    }
  }

  fn snapshot_source(&self) -> SnapshotSource {
    let mut source = SnapshotSource::new(expand_tilde(&self.snapshot_dir));
    if let Some(argv) = &self.refresh_command {
      source = source.with_refresh_command(
        argv.clone(),
        Duration::from_secs(self.refresh_timeout_minutes * 60),
      );
    }
    source
  }
}

// ─── Main ────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("TERRACE"))
    .build()
    .context("failed to read config file")?;
  let app_cfg: AppConfig = settings
    .try_deserialize()
    .context("failed to deserialise configuration")?;

  let store_path = expand_tilde(&app_cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  match cli.command {
    Command::Sync { force_refetch, force_rewrite } => {
      let engine =
        SyncEngine::new(store, app_cfg.snapshot_source(), app_cfg.sync_config());
      let report = engine
        .run(SyncOptions { force_refetch, force_rewrite })
        .await
        .context("sync run failed")?;
      print_run_summary(&report);
    }

    Command::Status => {
      let status = store.status().await.context("status query failed")?;
      for (table, t) in &status.tables {
        println!(
          "{table}: {} current / {} total rows",
          t.current_rows, t.total_rows
        );
        for (team, gameweek) in &t.progress {
          println!("  {team}: gameweek {gameweek}");
        }
      }
      println!("fixtures: {}", status.fixtures);
      if let Some(run) = &status.latest_run {
        println!(
          "last run: {} ({})",
          run.started_at,
          serde_json::to_string(&run.outcome)?
        );
      }
    }

    Command::Validate => {
      let engine =
        SyncEngine::new(store, app_cfg.snapshot_source(), app_cfg.sync_config());
      let violations =
        engine.validate().await.context("validation query failed")?;
      if violations.is_empty() {
        println!("store is sound");
      } else {
        for violation in &violations {
          eprintln!("violation: {violation}");
        }
        anyhow::bail!("{} invariant violation(s)", violations.len());
      }
    }

    Command::Serve => {
      let state = ApiState {
        store:  Arc::new(store),
        limits: app_cfg.limits.unwrap_or_default(),
      };
      let app = terrace_api::api_router(state)
        .layer(TraceLayer::new_for_http());
      let address = format!("{}:{}", app_cfg.host, app_cfg.port);

      tracing::info!("listening on http://{address}");
      let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
      axum::serve(listener, app).await.context("server error")?;
    }
  }

  Ok(())
}

fn print_run_summary(report: &RunReport) {
  match &report.outcome {
    RunOutcome::NoOp => println!("nothing stale, no writes"),
    RunOutcome::Succeeded => {
      println!(
        "updated {} team(s), wrote {} row(s)",
        report.teams_updated.len(),
        report.total_written()
      );
      for (table, written) in &report.records_written {
        println!("  {table}: +{written}");
      }
    }
    RunOutcome::Failed { message } => println!("run failed: {message}"),
  }
  if let Some(reason) = &report.escalated {
    println!("escalated: {reason}");
  }
  for issue in &report.mapping_issues {
    if !issue.unmapped.is_empty() {
      println!(
        "unmapped columns in {}: {}",
        issue.table,
        issue.unmapped.join(", ")
      );
    }
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
