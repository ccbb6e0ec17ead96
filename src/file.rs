//! Migration script discovery and filename parsing
//!
//! Migrations live under a root directory, one subdirectory per module
//! (`NNN_name`, 1-4 digit prefix). Each module holds paired scripts named
//! `NNNN_name_{up|down}.surql` with a 4-digit sequence number that is
//! independent from the module prefix.

use crate::error::MigrateError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// File extension for migration scripts
pub const SCRIPT_EXTENSION: &str = "surql";

static MODULE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,4})_(.+)$").expect("module directory regex"));

static SCRIPT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4})_([^_]+(?:_[^_]+)*)_(up|down)\.surql$").expect("script filename regex")
});

/// Migration direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }

    /// The direction that reverses this one
    #[must_use]
    pub fn opposite(&self) -> Direction {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            other => Err(MigrateError::InvalidFormat(format!(
                "Direction must be 'up' or 'down', got '{}'",
                other
            ))),
        }
    }
}

/// A discovered migration script on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationScript {
    /// Module directory name (`NNN_name`)
    pub module: String,

    /// 4-digit sequence number within the module
    pub number: u32,

    /// Human-readable migration name
    pub name: String,

    /// Script direction
    pub direction: Direction,

    /// Full filename (`NNNN_name_{up|down}.surql`)
    pub filename: String,

    /// Resolved filesystem path
    pub path: PathBuf,
}

impl MigrationScript {
    /// Parse a script filename into (sequence number, name, direction)
    ///
    /// Expected format: `NNNN_name_{up|down}.surql`, e.g.
    /// `0001_create_users_up.surql` -> (1, "create_users", Up).
    pub fn parse_filename(filename: &str) -> Result<(u32, String, Direction), MigrateError> {
        let caps = SCRIPT_RE.captures(filename).ok_or_else(|| {
            MigrateError::InvalidFormat(format!(
                "Migration file name '{}' does not match expected pattern: NNNN_name_{{up|down}}.{}",
                filename, SCRIPT_EXTENSION
            ))
        })?;

        let number = caps
            .get(1)
            .expect("number capture")
            .as_str()
            .parse::<u32>()
            .map_err(|e| {
                MigrateError::InvalidFormat(format!(
                    "Invalid sequence number in '{}': {}",
                    filename, e
                ))
            })?;
        let name = caps.get(2).expect("name capture").as_str().to_string();
        let direction = caps.get(3).expect("direction capture").as_str().parse()?;

        Ok((number, name, direction))
    }

    /// Read the raw script content from disk
    ///
    /// Content is never cached; every execution reads and hashes fresh bytes.
    pub fn read_content(&self) -> Result<String, MigrateError> {
        fs::read_to_string(&self.path).map_err(|e| {
            MigrateError::FileNotFound(format!(
                "Failed to read migration script {}: {}",
                self.path.display(),
                e
            ))
        })
    }
}

/// Parse a module directory name into its numeric prefix and name suffix
///
/// Returns `None` when the name does not match the `NNN_name` grammar.
#[must_use]
pub fn parse_module_name(dir_name: &str) -> Option<(u32, &str)> {
    let caps = MODULE_RE.captures(dir_name)?;
    let number = caps.get(1)?.as_str().parse::<u32>().ok()?;
    let name = caps.get(2)?.as_str();
    Some((number, name))
}

/// Discover module directories under the migrations root, sorted by name
///
/// Entries that are not directories or do not match the `NNN_name` grammar
/// are ignored, so the root can also hold the manifest and schema files.
pub fn discover_modules(root: &Path) -> Result<Vec<String>, MigrateError> {
    if !root.is_dir() {
        return Err(MigrateError::FileNotFound(format!(
            "Migrations directory does not exist: {}",
            root.display()
        )));
    }

    let entries = fs::read_dir(root).map_err(|e| {
        MigrateError::FileNotFound(format!(
            "Failed to read migrations directory {}: {}",
            root.display(),
            e
        ))
    })?;

    let mut modules = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| {
            MigrateError::FileNotFound(format!("Failed to read directory entry: {}", e))
        })?;
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if parse_module_name(name).is_some() {
            modules.push(name.to_string());
        }
    }

    // Zero-padded prefixes sort correctly as strings
    modules.sort();
    Ok(modules)
}

/// Discover migration scripts for one module, filtered by direction
///
/// Returns scripts sorted by sequence number (ascending). A module directory
/// that does not exist yields an empty list; a manifest may declare modules
/// whose scripts have not been written yet.
pub fn discover_scripts(
    root: &Path,
    module: &str,
    direction: Direction,
) -> Result<Vec<MigrationScript>, MigrateError> {
    let module_dir = root.join(module);
    if !module_dir.is_dir() {
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(&module_dir).map_err(|e| {
        MigrateError::FileNotFound(format!(
            "Failed to read module directory {}: {}",
            module_dir.display(),
            e
        ))
    })?;

    let mut scripts = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| {
            MigrateError::FileNotFound(format!("Failed to read directory entry: {}", e))
        })?;
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) != Some(SCRIPT_EXTENSION) {
            continue;
        }
        let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        let (number, name, file_direction) = MigrationScript::parse_filename(filename)?;
        if file_direction != direction {
            continue;
        }

        scripts.push(MigrationScript {
            module: module.to_string(),
            number,
            name,
            direction: file_direction,
            filename: filename.to_string(),
            path,
        });
    }

    scripts.sort_by_key(|s| s.number);
    Ok(scripts)
}
