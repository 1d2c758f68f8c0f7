//! Error type for the sync engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("consolidation error: {0}")]
  Ingest(#[from] terrace_ingest::Error),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  /// The upstream fetch collaborator failed after its own retries. The run
  /// aborts without writing, leaving the previous current version intact.
  #[error("upstream source error: {0}")]
  Source(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("source store has no fixtures")]
  NoFixtures,

  #[error("invariant validation failed with {0} violation(s)")]
  InvariantViolations(usize),
}

impl Error {
  pub(crate) fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }

  pub(crate) fn source<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Source(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
