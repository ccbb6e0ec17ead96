//! Module dependency graph and execution ordering
//!
//! The graph is built once per engine session from the validated (or
//! synthesized) manifest and never mutated afterwards. Modules are plain
//! identifiers in adjacency maps; dependents are the computed inverse edges.

use crate::error::MigrateError;
use crate::manifest::Manifest;
use std::collections::{HashMap, HashSet};

/// Result of a dependency-level rollback check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackCheck {
    pub can_rollback: bool,
    /// Dependent modules that are neither absent nor part of the target set
    pub blocked_by: Vec<String>,
}

/// Dependency graph over module identifiers
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    /// All module ids, sorted
    order: Vec<String>,
    dependencies: HashMap<String, Vec<String>>,
    dependents: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// Build the graph from a validated manifest
    #[must_use]
    pub fn from_manifest(manifest: &Manifest) -> Self {
        let order = manifest.module_ids();
        let mut dependencies: HashMap<String, Vec<String>> = HashMap::new();
        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();

        for id in &order {
            dependencies.insert(id.clone(), Vec::new());
            dependents.insert(id.clone(), Vec::new());
        }
        for (id, module) in &manifest.modules {
            for dep in module.depends.as_deref().unwrap_or(&[]) {
                if dependencies.contains_key(dep) {
                    dependencies.get_mut(id).expect("known module").push(dep.clone());
                    dependents.get_mut(dep).expect("known module").push(id.clone());
                }
            }
        }
        for edges in dependents.values_mut() {
            edges.sort();
        }

        Self {
            order,
            dependencies,
            dependents,
        }
    }

    /// All module identifiers, sorted
    #[must_use]
    pub fn modules(&self) -> &[String] {
        &self.order
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.dependencies.contains_key(id)
    }

    /// Direct dependencies of a module (not transitive)
    #[must_use]
    pub fn dependencies(&self, id: &str) -> &[String] {
        self.dependencies.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Direct dependents of a module (not transitive)
    #[must_use]
    pub fn dependents(&self, id: &str) -> &[String] {
        self.dependents.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Topological execution order: dependencies strictly before dependents
    ///
    /// With `targets` given, the order is restricted to the targets plus their
    /// transitive dependencies. Cycle detection runs here independently of
    /// manifest validation because the graph may come from an auto-discovered
    /// manifest that never passed through the loader.
    pub fn execution_order(
        &self,
        targets: Option<&[String]>,
    ) -> Result<Vec<String>, MigrateError> {
        let scope = self.scope(targets);

        let mut ordered = Vec::with_capacity(scope.len());
        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = Vec::new();

        // Deterministic: roots visited in sorted module order
        for id in &self.order {
            if scope.contains(id.as_str()) {
                self.visit(id, &scope, &mut visited, &mut stack, &mut ordered)?;
            }
        }
        Ok(ordered)
    }

    /// Rollback order: the exact reverse of [`execution_order`]
    pub fn rollback_order(&self, targets: Option<&[String]>) -> Result<Vec<String>, MigrateError> {
        let mut order = self.execution_order(targets)?;
        order.reverse();
        Ok(order)
    }

    /// Check whether a module may be rolled back
    ///
    /// A module is blocked by every dependent that exists in the graph and is
    /// not itself part of `targets`. Whether a blocking dependent actually has
    /// live migrations is the orchestrator's refinement, not the graph's.
    #[must_use]
    pub fn validate_rollback(&self, id: &str, targets: Option<&[String]>) -> RollbackCheck {
        let target_set: HashSet<&str> = targets
            .unwrap_or(&[])
            .iter()
            .map(String::as_str)
            .collect();

        let blocked_by: Vec<String> = self
            .dependents(id)
            .iter()
            .filter(|dependent| !target_set.contains(dependent.as_str()))
            .cloned()
            .collect();

        RollbackCheck {
            can_rollback: blocked_by.is_empty(),
            blocked_by,
        }
    }

    /// Targets plus their transitive dependencies; all modules when untargeted
    fn scope<'a>(&'a self, targets: Option<&'a [String]>) -> HashSet<&'a str> {
        match targets {
            None => self.order.iter().map(String::as_str).collect(),
            Some(targets) => {
                let mut scope: HashSet<&str> = HashSet::new();
                let mut pending: Vec<&str> = targets.iter().map(String::as_str).collect();
                while let Some(id) = pending.pop() {
                    if !scope.insert(id) {
                        continue;
                    }
                    for dep in self.dependencies(id) {
                        pending.push(dep);
                    }
                }
                scope
            }
        }
    }

    fn visit<'a>(
        &'a self,
        id: &'a str,
        scope: &HashSet<&str>,
        visited: &mut HashSet<&'a str>,
        stack: &mut Vec<&'a str>,
        ordered: &mut Vec<String>,
    ) -> Result<(), MigrateError> {
        if let Some(pos) = stack.iter().position(|s| *s == id) {
            let mut cycle: Vec<String> = stack[pos..].iter().map(|s| (*s).to_string()).collect();
            cycle.push(id.to_string());
            return Err(MigrateError::CircularDependency(cycle));
        }
        if visited.contains(id) {
            return Ok(());
        }

        stack.push(id);
        for dep in self.dependencies(id) {
            if scope.contains(dep.as_str()) {
                self.visit(dep, scope, visited, stack, ordered)?;
            }
        }
        stack.pop();
        visited.insert(id);
        ordered.push(id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest;

    fn graph_from(json: &str) -> DependencyGraph {
        let manifest: Manifest = serde_json::from_str(json).unwrap();
        DependencyGraph::from_manifest(&manifest)
    }

    fn chain() -> DependencyGraph {
        graph_from(
            r#"{
                "modules": {
                    "000_admin": { "name": "admin", "depends": [] },
                    "010_auth": { "name": "auth", "depends": ["000_admin"] },
                    "020_schema": { "name": "schema", "depends": ["010_auth"] }
                }
            }"#,
        )
    }

    #[test]
    fn test_execution_order_chain() {
        let order = chain().execution_order(None).unwrap();
        assert_eq!(order, vec!["000_admin", "010_auth", "020_schema"]);
    }

    #[test]
    fn test_execution_order_diamond() {
        let graph = graph_from(
            r#"{
                "modules": {
                    "000_base": { "name": "base", "depends": [] },
                    "010_left": { "name": "left", "depends": ["000_base"] },
                    "020_right": { "name": "right", "depends": ["000_base"] },
                    "030_top": { "name": "top", "depends": ["010_left", "020_right"] }
                }
            }"#,
        );
        let order = graph.execution_order(None).unwrap();
        let pos = |id: &str| order.iter().position(|m| m == id).unwrap();
        assert_eq!(pos("000_base"), 0);
        assert!(pos("010_left") < pos("030_top"));
        assert!(pos("020_right") < pos("030_top"));
    }

    #[test]
    fn test_execution_order_targets_pull_in_dependencies() {
        let order = chain()
            .execution_order(Some(&["020_schema".to_string()]))
            .unwrap();
        assert_eq!(order, vec!["000_admin", "010_auth", "020_schema"]);

        let order = chain()
            .execution_order(Some(&["010_auth".to_string()]))
            .unwrap();
        assert_eq!(order, vec!["000_admin", "010_auth"]);
    }

    #[test]
    fn test_rollback_order_is_reverse() {
        let graph = chain();
        let mut expected = graph.execution_order(None).unwrap();
        expected.reverse();
        assert_eq!(graph.rollback_order(None).unwrap(), expected);
    }

    #[test]
    fn test_cycle_detection_names_member() {
        let graph = graph_from(
            r#"{
                "modules": {
                    "000_a": { "name": "a", "depends": ["010_b"] },
                    "010_b": { "name": "b", "depends": ["000_a"] }
                }
            }"#,
        );
        let err = graph.execution_order(None).unwrap_err();
        match err {
            MigrateError::CircularDependency(cycle) => {
                assert!(cycle.contains(&"000_a".to_string()));
                assert!(cycle.contains(&"010_b".to_string()));
            }
            other => panic!("expected CircularDependency, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_rollback_blocked_by_dependent() {
        let graph = chain();
        let check = graph.validate_rollback("000_admin", None);
        assert!(!check.can_rollback);
        assert_eq!(check.blocked_by, vec!["010_auth"]);

        // Dependent included in the target set is not a blocker
        let targets = vec!["000_admin".to_string(), "010_auth".to_string()];
        let check = graph.validate_rollback("000_admin", Some(&targets));
        assert!(check.can_rollback);

        // Leaf module has no dependents
        let check = graph.validate_rollback("020_schema", None);
        assert!(check.can_rollback);
    }

    #[test]
    fn test_direct_edges_only() {
        let graph = chain();
        assert_eq!(graph.dependencies("020_schema"), ["010_auth"]);
        assert!(graph.dependencies("000_admin").is_empty());
        assert_eq!(graph.dependents("000_admin"), ["010_auth"]);
        assert!(graph.dependents("020_schema").is_empty());
    }

    #[test]
    fn test_synthesized_manifest_orders_linearly() {
        let ids = vec![
            "000_admin".to_string(),
            "010_auth".to_string(),
            "020_schema".to_string(),
        ];
        let graph = DependencyGraph::from_manifest(&manifest::synthesize_manifest(&ids));
        assert_eq!(graph.execution_order(None).unwrap(), ids);
    }
}
