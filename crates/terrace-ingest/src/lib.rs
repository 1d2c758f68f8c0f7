//! Column mapping and entity consolidation for Terrace.
//!
//! Converts the scraper's narrow source tables into wide canonical records.
//! Pure and synchronous; no HTTP or database dependencies.
//!
//! # Quick start
//!
//! ```no_run
//! use std::collections::BTreeMap;
//! use terrace_ingest::Consolidator;
//!
//! let tables = BTreeMap::new(); // name -> SourceTable, from the source store
//! let consolidated = Consolidator::new()
//!   .consolidate_all(&tables, "2024-2025")
//!   .unwrap();
//! for (kind, records) in &consolidated.records {
//!   println!("{}: {} records", kind.table(), records.len());
//! }
//! ```

pub mod consolidate;
pub mod error;
pub mod mappings;

pub use consolidate::{Consolidated, Consolidator};
pub use error::{Error, Result};
pub use mappings::MappingRegistry;
