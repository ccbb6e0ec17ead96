//! Module lock evaluation
//!
//! Locks are declared in the manifest (`locked: true` plus an optional
//! `lockReason`) and veto mutating operations on a module. They are advisory:
//! the orchestrator enforces them by filtering or refusing batches, and an
//! explicit force flag always bypasses them. They are not a cross-process
//! mutual-exclusion primitive.

use crate::manifest::Manifest;
use std::collections::HashMap;

const DEFAULT_REASON: &str = "module is locked";

/// A module set partitioned by lock state
#[derive(Debug, Clone, Default)]
pub struct LockPartition {
    pub allowed: Vec<String>,
    /// Blocked modules with their lock reasons
    pub blocked: Vec<(String, String)>,
}

impl LockPartition {
    #[must_use]
    pub fn all_allowed(&self) -> bool {
        self.blocked.is_empty()
    }
}

/// Evaluates per-module lock flags from the manifest
#[derive(Debug, Clone)]
pub struct LockManager {
    locks: HashMap<String, Option<String>>,
}

impl LockManager {
    #[must_use]
    pub fn from_manifest(manifest: &Manifest) -> Self {
        let locks = manifest
            .modules
            .iter()
            .filter(|(_, module)| module.locked.unwrap_or(false))
            .map(|(id, module)| (id.clone(), module.lock_reason.clone()))
            .collect();
        Self { locks }
    }

    #[must_use]
    pub fn is_locked(&self, id: &str) -> bool {
        self.locks.contains_key(id)
    }

    #[must_use]
    pub fn lock_reason(&self, id: &str) -> Option<&str> {
        self.locks
            .get(id)
            .map(|reason| reason.as_deref().unwrap_or(DEFAULT_REASON))
    }

    /// Partition a migration batch by lock state
    #[must_use]
    pub fn validate_migration_lock(&self, ids: &[String]) -> LockPartition {
        self.partition(ids)
    }

    /// Partition a rollback batch by lock state
    #[must_use]
    pub fn validate_rollback_lock(&self, ids: &[String]) -> LockPartition {
        self.partition(ids)
    }

    fn partition(&self, ids: &[String]) -> LockPartition {
        let mut result = LockPartition::default();
        for id in ids {
            match self.lock_reason(id) {
                Some(reason) => result.blocked.push((id.clone(), reason.to_string())),
                None => result.allowed.push(id.clone()),
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> LockManager {
        let manifest: Manifest = serde_json::from_str(
            r#"{
                "modules": {
                    "000_admin": { "name": "admin", "depends": [] },
                    "010_auth": { "name": "auth", "depends": ["000_admin"],
                                  "locked": true, "lockReason": "frozen during audit" },
                    "020_schema": { "name": "schema", "depends": ["010_auth"], "locked": true }
                }
            }"#,
        )
        .unwrap();
        LockManager::from_manifest(&manifest)
    }

    #[test]
    fn test_lock_flags() {
        let manager = manager();
        assert!(!manager.is_locked("000_admin"));
        assert!(manager.is_locked("010_auth"));
        assert_eq!(manager.lock_reason("010_auth"), Some("frozen during audit"));
        assert_eq!(manager.lock_reason("020_schema"), Some(DEFAULT_REASON));
        assert_eq!(manager.lock_reason("000_admin"), None);
    }

    #[test]
    fn test_partition() {
        let manager = manager();
        let ids = vec![
            "000_admin".to_string(),
            "010_auth".to_string(),
            "020_schema".to_string(),
        ];
        let partition = manager.validate_rollback_lock(&ids);
        assert_eq!(partition.allowed, vec!["000_admin"]);
        assert_eq!(partition.blocked.len(), 2);
        assert!(!partition.all_allowed());

        let partition = manager.validate_migration_lock(&["000_admin".to_string()]);
        assert!(partition.all_allowed());
    }
}
