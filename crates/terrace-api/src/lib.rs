//! JSON REST API for Terrace.
//!
//! Exposes an axum [`Router`] backed by any
//! [`terrace_core::store::AnalyticsStore`]. Read-only: this is the output
//! boundary reporting collaborators query, not a write surface and not a
//! dashboard. Auth, TLS, and transport concerns are the caller's
//! responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", terrace_api::api_router(state))
//! ```

pub mod error;
pub mod fixtures;
pub mod runs;
pub mod status;
pub mod tables;
pub mod validate;

use std::sync::Arc;

use axum::{Router, routing::get};
use terrace_core::{report::ValidationLimits, store::AnalyticsStore};

pub use error::ApiError;

/// Shared state threaded through all handlers.
pub struct ApiState<S> {
  pub store:  Arc<S>,
  pub limits: ValidationLimits,
}

impl<S> Clone for ApiState<S> {
  fn clone(&self) -> Self {
    Self { store: self.store.clone(), limits: self.limits }
  }
}

/// Build a fully-materialised API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(state: ApiState<S>) -> Router<()>
where
  S: AnalyticsStore + Send + Sync + 'static,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  Router::new()
    .route("/status", get(status::handler::<S>))
    .route("/fixtures", get(fixtures::handler::<S>))
    .route("/runs/latest", get(runs::latest::<S>))
    .route("/tables/{kind}/current", get(tables::current::<S>))
    .route("/tables/{kind}/history/{entity_id}", get(tables::history::<S>))
    .route("/validate", get(validate::handler::<S>))
    .with_state(state)
}
