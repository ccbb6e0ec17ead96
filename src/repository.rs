//! Migration history repository
//!
//! Owns the persisted execution-record store behind the executor. The store
//! is append-only: every attempt (success or fail) adds one row, and the
//! current state of a migration is always derived from its most recent row.
//! [`MigrationRepository::can_apply_migration`] is the single correctness
//! gate every mutation pathway must route through unless the caller forces.

use crate::error::MigrateError;
use crate::executor::SurrealExecutor;
use crate::file::Direction;
use crate::record::{ExecutionStatus, MigrationRecord};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// History table name
pub const MIGRATIONS_TABLE: &str = "basalt_migrations";

/// Fields the schema definition must declare
pub const REQUIRED_SCHEMA_FIELDS: &[&str] = &[
    "number",
    "name",
    "direction",
    "filename",
    "path",
    "content",
    "module",
    "status",
    "applied_by",
    "applied_at",
];

/// Default history table schema, applied idempotently on initialize
pub const DEFAULT_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS basalt_migrations SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS number ON basalt_migrations TYPE int;
DEFINE FIELD IF NOT EXISTS name ON basalt_migrations TYPE string;
DEFINE FIELD IF NOT EXISTS direction ON basalt_migrations TYPE string ASSERT $value IN ["up", "down"];
DEFINE FIELD IF NOT EXISTS filename ON basalt_migrations TYPE string;
DEFINE FIELD IF NOT EXISTS path ON basalt_migrations TYPE string;
DEFINE FIELD IF NOT EXISTS content ON basalt_migrations TYPE string;
DEFINE FIELD IF NOT EXISTS module ON basalt_migrations TYPE string;
DEFINE FIELD IF NOT EXISTS checksum ON basalt_migrations TYPE option<string>;
DEFINE FIELD IF NOT EXISTS status ON basalt_migrations TYPE string ASSERT $value IN ["success", "fail"];
DEFINE FIELD IF NOT EXISTS applied_by ON basalt_migrations TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON basalt_migrations TYPE string;
DEFINE FIELD IF NOT EXISTS execution_time_ms ON basalt_migrations TYPE option<int>;
DEFINE INDEX IF NOT EXISTS idx_basalt_migrations_latest ON basalt_migrations COLUMNS module, name, number, applied_at;
"#;

static PATH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.\-/\\: ]+$").expect("path character regex"));

/// Verdict from the applicability decision table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applicability {
    pub allowed: bool,
    pub reason: String,
}

/// Per-module applied aggregate
#[derive(Debug, Clone, Default)]
pub struct ModuleCounts {
    pub applied: usize,
    pub last_applied_at: Option<DateTime<Utc>>,
}

/// Append-only execution-record store
#[derive(Debug, Clone)]
pub struct MigrationRepository {
    schema: String,
}

impl MigrationRepository {
    /// Build the repository, resolving and validating the schema definition
    ///
    /// Uses the embedded default schema unless `schema_path` points at an
    /// override file. Fails fast when the definition is missing the table or
    /// any required field.
    pub fn new(schema_path: Option<&Path>) -> Result<Self, MigrateError> {
        let schema = match schema_path {
            Some(path) => fs::read_to_string(path).map_err(|e| {
                MigrateError::FileNotFound(format!(
                    "Failed to read schema definition {}: {}",
                    path.display(),
                    e
                ))
            })?,
            None => DEFAULT_SCHEMA.to_string(),
        };
        validate_schema(&schema)?;
        Ok(Self { schema })
    }

    /// Ensure the history table exists; idempotent
    pub fn initialize(&self, executor: &dyn SurrealExecutor) -> Result<(), MigrateError> {
        executor.query(&self.schema, &[]).map_err(|e| {
            MigrateError::Database(format!("Failed to initialize migration history table: {}", e))
        })?;
        Ok(())
    }

    /// Decide whether (number, name) may run in `direction` right now
    ///
    /// Decision table over the most recent record:
    /// no record -> allow up, forbid down; last attempt failed -> allow both
    /// (a failed attempt leaves no committed state); up+success -> forbid up,
    /// allow down; down+success -> forbid down, allow up.
    pub fn can_apply_migration(
        &self,
        executor: &dyn SurrealExecutor,
        number: u32,
        name: &str,
        direction: Direction,
    ) -> Result<Applicability, MigrateError> {
        let latest = self.latest_record(executor, number, name)?;

        let verdict = match latest {
            None => match direction {
                Direction::Up => Applicability {
                    allowed: true,
                    reason: "never run".to_string(),
                },
                Direction::Down => Applicability {
                    allowed: false,
                    reason: "cannot roll back a migration that has never run".to_string(),
                },
            },
            Some(record) if record.status == ExecutionStatus::Fail => Applicability {
                allowed: true,
                reason: format!("last {} attempt failed; retry permitted", record.direction),
            },
            Some(record) => match (record.direction, direction) {
                (Direction::Up, Direction::Up) => Applicability {
                    allowed: false,
                    reason: format!("already applied at {}", record.applied_at.to_rfc3339()),
                },
                (Direction::Up, Direction::Down) => Applicability {
                    allowed: true,
                    reason: "currently applied".to_string(),
                },
                (Direction::Down, Direction::Down) => Applicability {
                    allowed: false,
                    reason: format!("already rolled back at {}", record.applied_at.to_rfc3339()),
                },
                (Direction::Down, Direction::Up) => Applicability {
                    allowed: true,
                    reason: "previously rolled back".to_string(),
                },
            },
        };
        Ok(verdict)
    }

    /// Append one execution record; never updates or removes prior rows
    pub fn add_migration(
        &self,
        executor: &dyn SurrealExecutor,
        record: &MigrationRecord,
    ) -> Result<(), MigrateError> {
        let mut problems = Vec::new();
        if record.name.is_empty() {
            problems.push("name must not be empty");
        }
        if record.filename.is_empty() {
            problems.push("filename must not be empty");
        }
        if record.module.is_empty() {
            problems.push("module must not be empty");
        }
        if record.content.is_empty() {
            problems.push("content must not be empty");
        }
        if record.applied_by.is_empty() {
            problems.push("applied_by must not be empty");
        }
        if record.path.is_empty() || !PATH_RE.is_match(&record.path) {
            problems.push("path is empty or contains disallowed characters");
        }
        if !problems.is_empty() {
            return Err(MigrateError::InvalidFormat(format!(
                "Refusing to record migration attempt: {}",
                problems.join("; ")
            )));
        }

        let row = serde_json::to_value(record).map_err(|e| {
            MigrateError::InvalidFormat(format!("Failed to serialize migration record: {}", e))
        })?;
        executor.create(MIGRATIONS_TABLE, &row).map_err(|e| {
            MigrateError::Database(format!("Failed to record migration attempt: {}", e))
        })
    }

    /// The live set: latest record per (module, name, number), up + success
    ///
    /// These are the migrations currently considered applied and therefore
    /// eligible to roll back.
    pub fn find_last_migrations(
        &self,
        executor: &dyn SurrealExecutor,
        modules: &[String],
    ) -> Result<Vec<MigrationRecord>, MigrateError> {
        let records = self.records_for_modules(executor, modules)?;

        let mut latest: Vec<MigrationRecord> = Vec::new();
        let mut seen: Vec<(String, String, u32)> = Vec::new();
        // records arrive newest-first; the first hit per triple is the latest
        for record in records {
            let key = (record.module.clone(), record.name.clone(), record.number);
            if seen.contains(&key) {
                continue;
            }
            seen.push(key);
            if record.is_live() {
                latest.push(record);
            }
        }
        Ok(latest)
    }

    /// Batched per-module applied counts and most recent applied timestamp
    pub fn module_status_counts(
        &self,
        executor: &dyn SurrealExecutor,
        modules: &[String],
    ) -> Result<HashMap<String, ModuleCounts>, MigrateError> {
        let live = self.find_last_migrations(executor, modules)?;

        let mut counts: HashMap<String, ModuleCounts> = HashMap::new();
        for record in live {
            let entry = counts.entry(record.module.clone()).or_default();
            entry.applied += 1;
            if entry
                .last_applied_at
                .map(|at| record.applied_at > at)
                .unwrap_or(true)
            {
                entry.last_applied_at = Some(record.applied_at);
            }
        }
        Ok(counts)
    }

    /// Wipe the whole history table
    ///
    /// The only deletion pathway in the engine; everything else appends.
    pub fn reset(&self, executor: &dyn SurrealExecutor) -> Result<(), MigrateError> {
        executor
            .query(&format!("DELETE {};", MIGRATIONS_TABLE), &[])
            .map_err(|e| {
                MigrateError::Database(format!("Failed to reset migration history: {}", e))
            })?;
        Ok(())
    }

    fn latest_record(
        &self,
        executor: &dyn SurrealExecutor,
        number: u32,
        name: &str,
    ) -> Result<Option<MigrationRecord>, MigrateError> {
        let statement = format!(
            "SELECT * FROM {} WHERE number = $number AND name = $name ORDER BY applied_at DESC LIMIT 1",
            MIGRATIONS_TABLE
        );
        let rows = executor
            .query(
                &statement,
                &[("number", json!(number)), ("name", json!(name))],
            )
            .map_err(|e| {
                MigrateError::Database(format!("Failed to query migration history: {}", e))
            })?;

        rows.first().map(MigrationRecord::from_row).transpose()
    }

    fn records_for_modules(
        &self,
        executor: &dyn SurrealExecutor,
        modules: &[String],
    ) -> Result<Vec<MigrationRecord>, MigrateError> {
        if modules.is_empty() {
            return Ok(Vec::new());
        }
        let statement = format!(
            "SELECT * FROM {} WHERE module IN $modules ORDER BY applied_at DESC",
            MIGRATIONS_TABLE
        );
        let rows = executor
            .query(&statement, &[("modules", json!(modules))])
            .map_err(|e| {
                MigrateError::Database(format!("Failed to query migration history: {}", e))
            })?;

        rows.iter().map(MigrationRecord::from_row).collect()
    }
}

/// Check a schema definition for the table and every required field
pub fn validate_schema(schema: &str) -> Result<(), MigrateError> {
    let mut missing = Vec::new();
    if !schema.contains("DEFINE TABLE") {
        missing.push("DEFINE TABLE statement".to_string());
    }
    for field in REQUIRED_SCHEMA_FIELDS {
        let needle = format!("DEFINE FIELD IF NOT EXISTS {} ", field);
        let bare = format!("DEFINE FIELD {} ", field);
        if !schema.contains(&needle) && !schema.contains(&bare) {
            missing.push(format!("field '{}'", field));
        }
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(MigrateError::InvalidFormat(format!(
            "Migration schema definition is missing: {}",
            missing.join(", ")
        )))
    }
}
