//! Handler for `GET /runs/latest`.

use axum::{Json, extract::State};
use terrace_core::{report::RunReport, store::AnalyticsStore};

use crate::{ApiState, error::ApiError};

pub async fn latest<S>(
  State(state): State<ApiState<S>>,
) -> Result<Json<RunReport>, ApiError>
where
  S: AnalyticsStore,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  state
    .store
    .latest_run()
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?
    .map(Json)
    .ok_or_else(|| ApiError::NotFound("no sync runs recorded".to_string()))
}
