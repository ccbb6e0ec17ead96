//! Short-pattern resolution for modules and migration files
//!
//! Users address modules and files without spelling out zero-padded
//! identifiers: `10` and `auth` both resolve to `010_auth`, `3` resolves to
//! `0003_add_index_up.surql` within a module scope.

use crate::error::MigrateError;
use crate::file::{self, Direction, MigrationScript};
use crate::graph::DependencyGraph;
use std::path::{Path, PathBuf};

/// Resolves user-supplied patterns against the discovered module layout
#[derive(Debug, Clone)]
pub struct PatternResolver {
    /// Sorted module identifiers
    modules: Vec<String>,
    root: PathBuf,
}

impl PatternResolver {
    pub fn new(modules: Vec<String>, root: impl AsRef<Path>) -> Self {
        Self {
            modules,
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Resolve one pattern to a module identifier
    ///
    /// Precedence: a numeric pattern below the module count is a positional
    /// index into the sorted list; any other numeric pattern matches the
    /// module prefix with leading zeros ignored; everything else tries exact
    /// identifier (case-insensitive), then name suffix, then a reconstructed
    /// `number_name` form. Returns `None` rather than failing so callers can
    /// aggregate every unresolved pattern into one error.
    #[must_use]
    pub fn resolve_module(&self, pattern: &str) -> Option<&str> {
        if !pattern.is_empty() && pattern.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(value) = pattern.parse::<u32>() {
                if (value as usize) < self.modules.len() {
                    return Some(&self.modules[value as usize]);
                }
                return self
                    .modules
                    .iter()
                    .find(|id| matches!(file::parse_module_name(id), Some((n, _)) if n == value))
                    .map(String::as_str);
            }
            return None;
        }

        if let Some(id) = self
            .modules
            .iter()
            .find(|id| id.eq_ignore_ascii_case(pattern))
        {
            return Some(id);
        }
        if let Some(id) = self.modules.iter().find(
            |id| matches!(file::parse_module_name(id), Some((_, name)) if name.eq_ignore_ascii_case(pattern)),
        ) {
            return Some(id);
        }

        // Reconstructed number_name, e.g. "10_auth" for "010_auth"
        let (number_part, name_part) = pattern.split_once('_')?;
        if number_part.is_empty() || !number_part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let number = number_part.parse::<u32>().ok()?;
        self.modules
            .iter()
            .find(|id| {
                matches!(
                    file::parse_module_name(id),
                    Some((n, name)) if n == number && name.eq_ignore_ascii_case(name_part)
                )
            })
            .map(String::as_str)
    }

    /// Resolve a set of patterns to module identifiers
    ///
    /// All unresolved patterns are aggregated into one
    /// [`MigrateError::PatternNotFound`] naming the full candidate list.
    /// Duplicates collapse while preserving first-mention order.
    pub fn resolve_modules(&self, patterns: &[String]) -> Result<Vec<String>, MigrateError> {
        let mut resolved: Vec<String> = Vec::new();
        let mut unresolved: Vec<String> = Vec::new();

        for pattern in patterns {
            match self.resolve_module(pattern) {
                Some(id) => {
                    if !resolved.iter().any(|r| r == id) {
                        resolved.push(id.to_string());
                    }
                }
                None => unresolved.push(pattern.clone()),
            }
        }

        if unresolved.is_empty() {
            Ok(resolved)
        } else {
            Err(MigrateError::PatternNotFound {
                patterns: unresolved,
                candidates: self.modules.clone(),
            })
        }
    }

    /// Resolve filename patterns within a module scope and direction
    ///
    /// Each pattern is tested per file as: exact filename, numeric sequence
    /// (leading zeros stripped), name exact-or-substring, or `number_name`.
    /// A pattern matching several files returns *all* of them -- the same
    /// sequence number can legitimately exist in several modules, so callers
    /// needing one file must scope by module first. Patterns matching nothing
    /// are aggregated into one error listing the scoped candidates.
    pub fn resolve_files(
        &self,
        patterns: &[String],
        scope: &[String],
        direction: Direction,
    ) -> Result<Vec<MigrationScript>, MigrateError> {
        let mut candidates: Vec<MigrationScript> = Vec::new();
        for module in scope {
            candidates.extend(file::discover_scripts(&self.root, module, direction)?);
        }

        let mut matched: Vec<MigrationScript> = Vec::new();
        let mut unresolved: Vec<String> = Vec::new();

        for pattern in patterns {
            let hits: Vec<&MigrationScript> = candidates
                .iter()
                .filter(|script| Self::matches_script(script, pattern))
                .collect();
            if hits.is_empty() {
                unresolved.push(pattern.clone());
                continue;
            }
            for hit in hits {
                if !matched.iter().any(|m| m.path == hit.path) {
                    matched.push(hit.clone());
                }
            }
        }

        if unresolved.is_empty() {
            Ok(matched)
        } else {
            Err(MigrateError::PatternNotFound {
                patterns: unresolved,
                candidates: candidates.iter().map(|s| s.filename.clone()).collect(),
            })
        }
    }

    /// Resolve rollback filename patterns, surfacing dependency warnings
    ///
    /// On top of [`resolve_files`], every resolved file's owning module is
    /// checked against the dependency graph's rollback validation; violations
    /// come back as non-fatal warnings for the caller to log or display.
    pub fn resolve_rollback_files(
        &self,
        patterns: &[String],
        scope: &[String],
        graph: &DependencyGraph,
        targets: &[String],
    ) -> Result<(Vec<MigrationScript>, Vec<String>), MigrateError> {
        let matched = self.resolve_files(patterns, scope, Direction::Down)?;

        let mut warnings = Vec::new();
        let mut checked: Vec<&str> = Vec::new();
        for script in &matched {
            if checked.contains(&script.module.as_str()) {
                continue;
            }
            checked.push(&script.module);
            let check = graph.validate_rollback(&script.module, Some(targets));
            if !check.can_rollback {
                warnings.push(format!(
                    "rolling back '{}' out of dependency order: blocked by {}",
                    script.module,
                    check.blocked_by.join(", ")
                ));
            }
        }

        Ok((matched, warnings))
    }

    fn matches_script(script: &MigrationScript, pattern: &str) -> bool {
        if script.filename == pattern {
            return true;
        }
        if !pattern.is_empty() && pattern.bytes().all(|b| b.is_ascii_digit()) {
            return pattern
                .parse::<u32>()
                .map(|n| n == script.number)
                .unwrap_or(false);
        }
        if script.name == pattern || script.name.contains(pattern) {
            return true;
        }
        if let Some((number_part, name_part)) = pattern.split_once('_') {
            if !number_part.is_empty() && number_part.bytes().all(|b| b.is_ascii_digit()) {
                if let Ok(number) = number_part.parse::<u32>() {
                    return number == script.number && name_part == script.name;
                }
            }
        }
        false
    }
}
