//! Handler for `GET /validate` — the invariant checks, standalone.
//!
//! The expected per-team progress is derived from the store itself (the max
//! current-row gameweek across the four tables), so this catches duplicate
//! current rows, cross-table progress disagreements, inverted validity
//! ranges, and out-of-range counts without needing the source store.

use std::collections::BTreeMap;

use axum::{
  Json,
  extract::{Query, State},
};
use serde::{Deserialize, Serialize};
use terrace_core::{
  entity::EntityKind, fixture::TeamProgress, report::InvariantViolation,
  store::AnalyticsStore,
};

use crate::{ApiState, error::ApiError};

const ALL_KINDS: [EntityKind; 4] = [
  EntityKind::Outfield,
  EntityKind::Goalkeeper,
  EntityKind::Squad,
  EntityKind::Opponent,
];

#[derive(Debug, Deserialize)]
pub struct ValidateParams {
  /// The season to check counts and progress for.
  pub season: String,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
  pub valid:      bool,
  pub violations: Vec<InvariantViolation>,
}

/// `GET /validate?season=2024-2025`
pub async fn handler<S>(
  State(state): State<ApiState<S>>,
  Query(params): Query<ValidateParams>,
) -> Result<Json<ValidateResponse>, ApiError>
where
  S: AnalyticsStore,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let mut expected: TeamProgress = BTreeMap::new();
  for kind in ALL_KINDS {
    let progress = state
      .store
      .team_progress(kind)
      .await
      .map_err(|e| ApiError::Store(Box::new(e)))?;
    for (team, gameweek) in progress {
      let entry = expected.entry(team).or_insert(gameweek);
      if gameweek > *entry {
        *entry = gameweek;
      }
    }
  }

  let violations = state
    .store
    .validate(params.season, expected, state.limits)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;

  Ok(Json(ValidateResponse { valid: violations.is_empty(), violations }))
}
