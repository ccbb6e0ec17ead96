//! Module manifest loading, validation and synthesis
//!
//! The manifest is a JSON document at the migrations root declaring the
//! modules, their dependency edges, optional locks and engine settings:
//!
//! ```json
//! {
//!   "modules": {
//!     "000_admin": { "name": "admin", "depends": [] },
//!     "010_auth": { "name": "auth", "depends": ["000_admin"], "locked": true,
//!                   "lockReason": "frozen during audit" }
//!   },
//!   "settings": { "useTransactions": true, "defaultNamespace": "app" }
//! }
//! ```
//!
//! When no manifest file exists the engine auto-discovers modules from the
//! directory layout and synthesizes a linear default manifest.

use crate::error::MigrateError;
use crate::file;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Manifest filenames probed at the migrations root, in order
pub const MANIFEST_CANDIDATES: &[&str] = &["basalt.json", "migration-config.json", "basalt.yaml"];

/// One module declaration
///
/// Required fields are modeled as `Option` so a malformed manifest parses far
/// enough for [`validate`] to report every problem at once instead of failing
/// on the first missing key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleConfig {
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub depends: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked: Option<bool>,
    #[serde(rename = "lockReason", default, skip_serializing_if = "Option::is_none")]
    pub lock_reason: Option<String>,
}

/// Engine settings carried by the manifest
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_transactions: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_database: Option<String>,
}

impl ManifestSettings {
    /// Transaction wrapping defaults to on
    #[must_use]
    pub fn use_transactions(&self) -> bool {
        self.use_transactions.unwrap_or(true)
    }
}

/// The validated module manifest
///
/// Modules are kept in a `BTreeMap` so iteration order is the sorted module
/// order everywhere the manifest is consumed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub modules: BTreeMap<String, ModuleConfig>,
    #[serde(default)]
    pub settings: ManifestSettings,
}

impl Manifest {
    /// Sorted module identifiers
    #[must_use]
    pub fn module_ids(&self) -> Vec<String> {
        self.modules.keys().cloned().collect()
    }
}

/// Locate and load the manifest
///
/// An explicit path must exist; otherwise the candidates in
/// [`MANIFEST_CANDIDATES`] are probed under `root`. Returns `Ok(None)` when no
/// manifest file exists so the caller can fall back to filesystem discovery.
pub fn load_manifest(
    root: &Path,
    explicit: Option<&Path>,
) -> Result<Option<Manifest>, MigrateError> {
    let path: PathBuf = match explicit {
        Some(path) => {
            if !path.is_file() {
                return Err(MigrateError::FileNotFound(format!(
                    "Manifest file does not exist: {}",
                    path.display()
                )));
            }
            path.to_path_buf()
        }
        None => {
            let Some(found) = MANIFEST_CANDIDATES
                .iter()
                .map(|name| root.join(name))
                .find(|candidate| candidate.is_file())
            else {
                return Ok(None);
            };
            found
        }
    };

    let content = fs::read_to_string(&path).map_err(|e| {
        MigrateError::FileNotFound(format!("Failed to read manifest {}: {}", path.display(), e))
    })?;

    let manifest = parse_manifest(&content, &path)?;
    validate(&manifest)?;
    Ok(Some(manifest))
}

fn parse_manifest(content: &str, path: &Path) -> Result<Manifest, MigrateError> {
    let is_yaml = matches!(
        path.extension().and_then(|s| s.to_str()),
        Some("yaml") | Some("yml")
    );

    match serde_json::from_str::<Manifest>(content) {
        Ok(manifest) => Ok(manifest),
        // YAML manifests are accepted only when their content is already
        // JSON-shaped; anything else is an unsupported format, not a parse bug
        Err(e) if is_yaml => Err(MigrateError::InvalidFormat(format!(
            "YAML manifest {} is not JSON-shaped; this format is not supported: {}",
            path.display(),
            e
        ))),
        Err(e) => Err(MigrateError::InvalidFormat(format!(
            "Failed to parse manifest {}: {}",
            path.display(),
            e
        ))),
    }
}

/// Validate the manifest, collecting every problem before failing
///
/// Checks the module identifier grammar, required fields, dangling dependency
/// references and dependency cycles. All violations are aggregated into one
/// [`MigrateError::Manifest`].
pub fn validate(manifest: &Manifest) -> Result<(), MigrateError> {
    let mut problems = Vec::new();

    for (id, module) in &manifest.modules {
        if file::parse_module_name(id).is_none() {
            problems.push(format!(
                "module identifier '{}' does not match the NNN_name pattern",
                id
            ));
        }
        if module.name.is_none() {
            problems.push(format!("module '{}' is missing required field 'name'", id));
        }
        match &module.depends {
            None => {
                problems.push(format!(
                    "module '{}' is missing required field 'depends'",
                    id
                ));
            }
            Some(depends) => {
                for dep in depends {
                    if !manifest.modules.contains_key(dep) {
                        problems.push(format!(
                            "module '{}' depends on unknown module '{}'",
                            id, dep
                        ));
                    }
                }
            }
        }
    }

    if let Some(cycle) = find_cycle(manifest) {
        problems.push(format!("circular dependency: {}", cycle.join(" -> ")));
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(MigrateError::Manifest(format!(
            "{} problem(s) found:\n  - {}",
            problems.len(),
            problems.join("\n  - ")
        )))
    }
}

/// DFS with a recursion stack; returns the offending cycle path if any
fn find_cycle(manifest: &Manifest) -> Option<Vec<String>> {
    let mut visited: Vec<&str> = Vec::new();
    let mut stack: Vec<&str> = Vec::new();

    fn visit<'a>(
        manifest: &'a Manifest,
        id: &'a str,
        visited: &mut Vec<&'a str>,
        stack: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        if let Some(pos) = stack.iter().position(|s| *s == id) {
            let mut cycle: Vec<String> = stack[pos..].iter().map(|s| (*s).to_string()).collect();
            cycle.push(id.to_string());
            return Some(cycle);
        }
        if visited.contains(&id) {
            return None;
        }
        stack.push(id);
        if let Some(module) = manifest.modules.get(id) {
            for dep in module.depends.as_deref().unwrap_or(&[]) {
                // Dangling references are reported separately; skip them here
                if manifest.modules.contains_key(dep) {
                    if let Some(cycle) = visit(manifest, dep, visited, stack) {
                        return Some(cycle);
                    }
                }
            }
        }
        stack.pop();
        visited.push(id);
        None
    }

    for id in manifest.modules.keys() {
        if let Some(cycle) = visit(manifest, id, &mut visited, &mut stack) {
            return Some(cycle);
        }
    }
    None
}

/// Build a default manifest from discovered module directories
///
/// Names derive from the identifier suffix and dependencies form a linear
/// chain: each module depends on the one before it in sorted order.
#[must_use]
pub fn synthesize_manifest(module_ids: &[String]) -> Manifest {
    let mut modules = BTreeMap::new();
    let mut previous: Option<&String> = None;

    for id in module_ids {
        let name = file::parse_module_name(id)
            .map(|(_, name)| name.to_string())
            .unwrap_or_else(|| id.clone());
        modules.insert(
            id.clone(),
            ModuleConfig {
                name: Some(name),
                description: None,
                depends: Some(previous.map(|p| vec![p.clone()]).unwrap_or_default()),
                locked: None,
                lock_reason: None,
            },
        );
        previous = Some(id);
    }

    Manifest {
        modules,
        settings: ManifestSettings::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest_from(json: &str) -> Manifest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_valid_manifest_passes() {
        let manifest = manifest_from(
            r#"{
                "modules": {
                    "000_admin": { "name": "admin", "depends": [] },
                    "010_auth": { "name": "auth", "depends": ["000_admin"] }
                },
                "settings": { "useTransactions": false, "defaultNamespace": "app" }
            }"#,
        );
        assert!(validate(&manifest).is_ok());
        assert!(!manifest.settings.use_transactions());
        assert_eq!(manifest.settings.default_namespace.as_deref(), Some("app"));
    }

    #[test]
    fn test_validation_collects_all_problems() {
        let manifest = manifest_from(
            r#"{
                "modules": {
                    "admin": { "depends": ["999_missing"] },
                    "010_auth": { "name": "auth" }
                }
            }"#,
        );
        let err = validate(&manifest).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("does not match the NNN_name pattern"));
        assert!(message.contains("missing required field 'name'"));
        assert!(message.contains("missing required field 'depends'"));
        assert!(message.contains("unknown module '999_missing'"));
        assert!(message.contains("4 problem(s)"));
    }

    #[test]
    fn test_validation_reports_cycle_path() {
        let manifest = manifest_from(
            r#"{
                "modules": {
                    "000_a": { "name": "a", "depends": ["010_b"] },
                    "010_b": { "name": "b", "depends": ["020_c"] },
                    "020_c": { "name": "c", "depends": ["000_a"] }
                }
            }"#,
        );
        let err = validate(&manifest).unwrap_err();
        assert!(err.to_string().contains("circular dependency"));
        assert!(err.to_string().contains("000_a"));
    }

    #[test]
    fn test_load_manifest_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_manifest(dir.path(), None).unwrap().is_none());
    }

    #[test]
    fn test_load_manifest_candidate_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("basalt.json"),
            r#"{ "modules": { "000_admin": { "name": "admin", "depends": [] } } }"#,
        )
        .unwrap();
        let manifest = load_manifest(dir.path(), None).unwrap().unwrap();
        assert_eq!(manifest.module_ids(), vec!["000_admin"]);
    }

    #[test]
    fn test_yaml_manifest_must_be_json_shaped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("basalt.yaml");
        std::fs::write(&path, "modules:\n  000_admin:\n    name: admin\n").unwrap();
        let err = load_manifest(dir.path(), None).unwrap_err();
        assert!(err.to_string().contains("not supported"));
    }

    #[test]
    fn test_synthesize_linear_chain() {
        let ids = vec![
            "000_admin".to_string(),
            "010_auth".to_string(),
            "020_schema".to_string(),
        ];
        let manifest = synthesize_manifest(&ids);
        assert!(validate(&manifest).is_ok());
        assert_eq!(
            manifest.modules["000_admin"].name.as_deref(),
            Some("admin")
        );
        assert!(manifest.modules["000_admin"]
            .depends
            .as_ref()
            .unwrap()
            .is_empty());
        assert_eq!(
            manifest.modules["010_auth"].depends.as_ref().unwrap(),
            &vec!["000_admin".to_string()]
        );
        assert_eq!(
            manifest.modules["020_schema"].depends.as_ref().unwrap(),
            &vec!["010_auth".to_string()]
        );
    }
}
