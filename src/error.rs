//! Engine error types

use std::fmt;

/// Errors produced by the migration engine
#[derive(Debug)]
pub enum MigrateError {
    /// Connection or engine configuration is incomplete or malformed
    Config(String),
    /// Module manifest failed validation; the message enumerates every problem found
    Manifest(String),
    /// Cyclic module dependency, carrying the offending path
    CircularDependency(Vec<String>),
    /// Database execution error, wrapping the driver message
    Database(String),
    /// Filesystem path missing or unreadable
    FileNotFound(String),
    /// Malformed migration filename, module directory, manifest or schema definition
    InvalidFormat(String),
    /// User-supplied patterns that matched nothing
    PatternNotFound {
        patterns: Vec<String>,
        candidates: Vec<String>,
    },
    /// A `${VAR}` placeholder referenced variables missing from the environment
    UndefinedVariable(String),
    /// A script failed against the database
    ExecutionFailed {
        module: String,
        filename: String,
        error: String,
    },
    /// Workflow method called before `initialize()` or after `close()`
    NotInitialized,
}

impl fmt::Display for MigrateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrateError::Config(msg) => write!(f, "Configuration error: {}", msg),
            MigrateError::Manifest(msg) => write!(f, "Manifest validation failed: {}", msg),
            MigrateError::CircularDependency(path) => {
                write!(f, "Circular module dependency: {}", path.join(" -> "))
            }
            MigrateError::Database(msg) => write!(f, "Database error: {}", msg),
            MigrateError::FileNotFound(path) => write!(f, "File not found: {}", path),
            MigrateError::InvalidFormat(msg) => write!(f, "Invalid format: {}", msg),
            MigrateError::PatternNotFound { patterns, candidates } => {
                write!(
                    f,
                    "No match for pattern(s): {}\nAvailable: {}",
                    patterns.join(", "),
                    candidates.join(", ")
                )
            }
            MigrateError::UndefinedVariable(names) => {
                write!(f, "Undefined environment variable(s): {}", names)
            }
            MigrateError::ExecutionFailed { module, filename, error } => {
                write!(
                    f,
                    "Migration '{}' in module '{}' failed during execution: {}",
                    filename, module, error
                )
            }
            MigrateError::NotInitialized => {
                write!(
                    f,
                    "Migrator is not initialized. Call initialize() before running workflows."
                )
            }
        }
    }
}

impl std::error::Error for MigrateError {}
