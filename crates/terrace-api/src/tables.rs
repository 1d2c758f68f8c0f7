//! Handlers for the versioned-table endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET` | `/tables/:kind/current` | optional `?team=` filter |
//! | `GET` | `/tables/:kind/history/:entity_id` | full version history, oldest first |
//!
//! `:kind` accepts both the role discriminant (`outfield`) and the table
//! name (`players`).

use axum::{
  Json,
  extract::{Path, Query, State},
};
use serde::Deserialize;
use terrace_core::{
  entity::EntityKind, record::VersionedRecord, store::AnalyticsStore,
};

use crate::{ApiState, error::ApiError};

fn parse_kind(raw: &str) -> Result<EntityKind, ApiError> {
  EntityKind::parse(raw).map_err(|e| ApiError::BadRequest(e.to_string()))
}

#[derive(Debug, Deserialize)]
pub struct CurrentParams {
  /// Restrict to one team's rows.
  pub team: Option<String>,
}

/// `GET /tables/:kind/current[?team=...]`
pub async fn current<S>(
  State(state): State<ApiState<S>>,
  Path(kind): Path<String>,
  Query(params): Query<CurrentParams>,
) -> Result<Json<Vec<VersionedRecord>>, ApiError>
where
  S: AnalyticsStore,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let kind = parse_kind(&kind)?;
  let rows = state
    .store
    .current_rows(kind, params.team)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(rows))
}

/// `GET /tables/:kind/history/:entity_id`
pub async fn history<S>(
  State(state): State<ApiState<S>>,
  Path((kind, entity_id)): Path<(String, String)>,
) -> Result<Json<Vec<VersionedRecord>>, ApiError>
where
  S: AnalyticsStore,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let kind = parse_kind(&kind)?;
  let versions = state
    .store
    .history(kind, entity_id.clone())
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  if versions.is_empty() {
    return Err(ApiError::NotFound(format!(
      "no versions for {entity_id:?} in {}",
      kind.table()
    )));
  }
  Ok(Json(versions))
}
