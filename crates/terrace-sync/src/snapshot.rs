//! A [`StatSource`] over a scraper-exported snapshot directory.
//!
//! The excluded scraping collaborator writes its output as plain JSON files:
//!
//! ```text
//! snapshot/
//!   manifest.json        {"fetched_at": "2025-08-04T09:00:00Z"}
//!   fixtures.json        [Fixture, …]
//!   tables/
//!     player_standard.json   {"name": "player_standard", "rows": […]}
//!     …
//! ```
//!
//! `refresh()` shells out to a configured command — the scraper itself —
//! under a timeout. Fetch retries and backoff live on the scraper's side of
//! the boundary; a non-zero exit or a timeout here aborts the sync run
//! without writing.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use terrace_core::{
  fixture::Fixture,
  source::{SourceTable, StatSource},
};
use thiserror::Error;
use tracing::info;

// ─── Error ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SnapshotError {
  #[error("snapshot io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("snapshot parse error in {path}: {source}")]
  Parse {
    path:   String,
    source: serde_json::Error,
  },

  #[error("refresh command exited with {0}")]
  RefreshFailed(std::process::ExitStatus),

  #[error("refresh command timed out after {0:?}")]
  RefreshTimeout(Duration),

  #[error("no refresh command configured")]
  NoRefreshCommand,
}

// ─── Source ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Manifest {
  fetched_at: DateTime<Utc>,
}

pub struct SnapshotSource {
  dir:             PathBuf,
  refresh_command: Option<Vec<String>>,
  refresh_timeout: Duration,
}

impl SnapshotSource {
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    Self {
      dir:             dir.into(),
      refresh_command: None,
      // The scraper is rate-limited and slow by design.
      refresh_timeout: Duration::from_secs(30 * 60),
    }
  }

  /// Configure the external scraper invocation used for full re-fetches.
  pub fn with_refresh_command(
    mut self,
    argv: Vec<String>,
    timeout: Duration,
  ) -> Self {
    self.refresh_command = Some(argv);
    self.refresh_timeout = timeout;
    self
  }

  async fn read_json<T: serde::de::DeserializeOwned>(
    &self,
    path: &Path,
  ) -> Result<Option<T>, SnapshotError> {
    let raw = match tokio::fs::read_to_string(path).await {
      Ok(raw) => raw,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(e.into()),
    };
    serde_json::from_str(&raw)
      .map(Some)
      .map_err(|source| SnapshotError::Parse {
        path: path.display().to_string(),
        source,
      })
  }
}

impl StatSource for SnapshotSource {
  type Error = SnapshotError;

  async fn fixtures(&self) -> Result<Vec<Fixture>, SnapshotError> {
    Ok(
      self
        .read_json(&self.dir.join("fixtures.json"))
        .await?
        .unwrap_or_default(),
    )
  }

  async fn table(
    &self,
    name: &str,
  ) -> Result<Option<SourceTable>, SnapshotError> {
    self
      .read_json(&self.dir.join("tables").join(format!("{name}.json")))
      .await
  }

  /// The scraper's scheduler may rewrite the snapshot between our reads, so
  /// a recheck is a fresh read of just the named fixtures.
  async fn recheck_fixtures(
    &self,
    fixtures: &[Fixture],
  ) -> Result<Vec<Fixture>, SnapshotError> {
    let latest = self.fixtures().await?;
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

  async fn refresh(&self) -> Result<(), SnapshotError> {
    let Some(argv) = self.refresh_command.as_deref().filter(|a| !a.is_empty())
    else {
      return Err(SnapshotError::NoRefreshCommand);
    };

    info!(command = %argv.join(" "), "running upstream refresh command");
    let mut command = tokio::process::Command::new(&argv[0]);
    command.args(&argv[1..]).kill_on_drop(true);

    let status = tokio::time::timeout(self.refresh_timeout, command.status())
      .await
      .map_err(|_| SnapshotError::RefreshTimeout(self.refresh_timeout))??;

    if !status.success() {
      return Err(SnapshotError::RefreshFailed(status));
    }
    Ok(())
  }

  async fn last_refreshed(
    &self,
  ) -> Result<Option<DateTime<Utc>>, SnapshotError> {
    let manifest: Option<Manifest> =
      self.read_json(&self.dir.join("manifest.json")).await?;
    Ok(manifest.map(|m| m.fetched_at))
  }
}
