//! Error types for the terrace-ingest consolidation layer.

use terrace_core::entity::EntityKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A `(role, table)` pair the registry has no declared mapping for.
  /// Mappings are authored ahead of time; the registry never invents one.
  #[error("no mapping declared for table {0:?}")]
  UndeclaredTable(String),

  #[error("base table {0:?} missing from source")]
  MissingBaseTable(String),

  /// Two source tables map to the same destination column — an authoring
  /// bug that must stop the run rather than silently overwrite data.
  #[error("merging {table:?} would overwrite destination column {column:?}")]
  ColumnCollision { table: String, column: String },

  #[error("consolidation produced zero {0:?} records")]
  EmptyConsolidation(EntityKind),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
