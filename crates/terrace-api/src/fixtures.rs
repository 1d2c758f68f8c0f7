//! Handler for `GET /fixtures?season=...`.

use axum::{
  Json,
  extract::{Query, State},
};
use serde::Deserialize;
use terrace_core::{fixture::Fixture, store::AnalyticsStore};

use crate::{ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct FixturesParams {
  pub season: String,
}

pub async fn handler<S>(
  State(state): State<ApiState<S>>,
  Query(params): Query<FixturesParams>,
) -> Result<Json<Vec<Fixture>>, ApiError>
where
  S: AnalyticsStore,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let fixtures = state
    .store
    .fixtures(params.season)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(fixtures))
}
