//! Handler for `GET /status`.
//!
//! Returns per-table current-row counts and per-team progress
//! distributions, plus the most recent sync-run summary.

use axum::{Json, extract::State};
use terrace_core::{report::StatusReport, store::AnalyticsStore};

use crate::{ApiState, error::ApiError};

pub async fn handler<S>(
  State(state): State<ApiState<S>>,
) -> Result<Json<StatusReport>, ApiError>
where
  S: AnalyticsStore,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let status = state
    .store
    .status()
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(status))
}
