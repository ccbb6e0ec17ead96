//! # Basalt
//!
//! Module-aware schema migration engine for SurrealDB.
//!
//! Migrations are hand-authored SurrealQL scripts grouped into
//! dependency-ordered module directories (`NNN_name/NNNN_name_{up|down}.surql`).
//! The engine validates the module manifest, computes topological execution
//! and rollback orders, gates every run through an append-only history table,
//! and transforms script content (scope injection, transaction wrapping)
//! before executing it over the SurrealDB HTTP API.
//!
//! # Example
//!
//! ```rust,no_run
//! use basalt::{Migrator, MigratorOptions, Operation};
//!
//! # fn main() -> Result<(), basalt::MigrateError> {
//! let mut migrator = Migrator::new(MigratorOptions::default());
//! migrator.initialize()?;
//!
//! let report = migrator.execute(None, Operation::Migrate, None)?;
//! println!("applied {}, skipped {}", report.processed, report.skipped);
//!
//! migrator.close()?;
//! # Ok(())
//! # }
//! ```

pub mod checksum;
pub mod config;
pub mod content;
pub mod error;
pub mod executor;
pub mod file;
pub mod graph;
pub mod lock;
pub mod manifest;
pub mod migrator;
pub mod pattern;
pub mod record;
pub mod repository;
pub mod status;

// `crate::` disambiguates from the config crate itself
pub use crate::config::ConnectionSettings;
pub use content::{ContentProcessor, ScopeContext};
pub use error::MigrateError;
pub use executor::{HttpSurrealExecutor, SurrealExecutor};
pub use file::{Direction, MigrationScript};
pub use graph::DependencyGraph;
pub use lock::LockManager;
pub use manifest::Manifest;
pub use migrator::{Migrator, MigratorOptions, Operation};
pub use pattern::PatternResolver;
pub use record::{ExecutionStatus, MigrationRecord};
pub use repository::MigrationRepository;
pub use status::{ExecutionReport, FileOutcome, FileResult, RollbackValidation, StatusReport};
