//! Shared test fixtures: an in-memory executor and migration tree builders
#![allow(dead_code)]

use basalt::error::MigrateError;
use basalt::executor::SurrealExecutor;
use serde_json::Value;
use std::cell::RefCell;
use std::fs;
use std::path::Path;
use std::rc::Rc;

/// Observable state behind a [`MockExecutor`]
#[derive(Default)]
pub struct MockState {
    /// History table rows, in insertion order
    pub rows: Vec<Value>,
    /// Migration script content executed, in order
    pub executed: Vec<String>,
}

/// In-memory stand-in for the SurrealDB HTTP executor
///
/// Understands the handful of statement shapes the repository issues and
/// treats everything else as migration content. Content containing
/// `fail_marker` errors like a rejected script would.
pub struct MockExecutor {
    state: Rc<RefCell<MockState>>,
    fail_marker: Option<String>,
}

impl MockExecutor {
    pub fn new() -> (Self, Rc<RefCell<MockState>>) {
        let state = Rc::new(RefCell::new(MockState::default()));
        (
            Self {
                state: Rc::clone(&state),
                fail_marker: None,
            },
            state,
        )
    }

    pub fn failing_on(marker: &str) -> (Self, Rc<RefCell<MockState>>) {
        let (mut executor, state) = Self::new();
        executor.fail_marker = Some(marker.to_string());
        (executor, state)
    }

    /// Rows sorted newest-first; insertion order breaks timestamp ties
    fn rows_desc(&self) -> Vec<Value> {
        let mut rows = self.state.borrow().rows.clone();
        rows.sort_by(|a, b| {
            a["applied_at"]
                .as_str()
                .unwrap_or("")
                .cmp(b["applied_at"].as_str().unwrap_or(""))
        });
        rows.reverse();
        rows
    }

    fn param<'a>(params: &'a [(&str, Value)], name: &str) -> Option<&'a Value> {
        params.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }
}

impl SurrealExecutor for MockExecutor {
    fn query(&self, statement: &str, params: &[(&str, Value)]) -> Result<Vec<Value>, MigrateError> {
        let trimmed = statement.trim();

        if trimmed.contains("FROM basalt_migrations") && trimmed.contains("LIMIT 1") {
            let number = Self::param(params, "number").and_then(Value::as_u64);
            let name = Self::param(params, "name").and_then(Value::as_str);
            let hit = self
                .rows_desc()
                .into_iter()
                .find(|row| row["number"].as_u64() == number && row["name"].as_str() == name);
            return Ok(hit.into_iter().collect());
        }

        if trimmed.contains("FROM basalt_migrations") && trimmed.contains("module IN") {
            let modules: Vec<&str> = Self::param(params, "modules")
                .and_then(Value::as_array)
                .map(|values| values.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();
            return Ok(self
                .rows_desc()
                .into_iter()
                .filter(|row| {
                    row["module"]
                        .as_str()
                        .map(|m| modules.contains(&m))
                        .unwrap_or(false)
                })
                .collect());
        }

        if trimmed.starts_with("DELETE basalt_migrations") {
            self.state.borrow_mut().rows.clear();
            return Ok(Vec::new());
        }

        if trimmed.contains("DEFINE TABLE IF NOT EXISTS basalt_migrations") {
            return Ok(Vec::new());
        }

        // Everything else is migration content
        if let Some(marker) = &self.fail_marker {
            if trimmed.contains(marker.as_str()) {
                return Err(MigrateError::Database(format!(
                    "mock rejected statement containing '{}'",
                    marker
                )));
            }
        }
        self.state.borrow_mut().executed.push(trimmed.to_string());
        Ok(Vec::new())
    }

    fn create(&self, _table: &str, content: &Value) -> Result<(), MigrateError> {
        self.state.borrow_mut().rows.push(content.clone());
        Ok(())
    }

    fn close(&self) -> Result<(), MigrateError> {
        Ok(())
    }
}

/// Write one migration script under `root/module/filename`
pub fn write_script(root: &Path, module: &str, filename: &str, content: &str) {
    let dir = root.join(module);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(filename), content).unwrap();
}

/// A two-module project: `000_admin` with one migration, `010_auth`
/// (depending on it) with two
pub fn standard_project(root: &Path) {
    fs::write(
        root.join("basalt.json"),
        r#"{
            "modules": {
                "000_admin": { "name": "admin", "depends": [] },
                "010_auth": { "name": "auth", "depends": ["000_admin"] }
            }
        }"#,
    )
    .unwrap();

    write_script(
        root,
        "000_admin",
        "0001_define_roles_up.surql",
        "DEFINE TABLE roles SCHEMAFULL;",
    );
    write_script(
        root,
        "000_admin",
        "0001_define_roles_down.surql",
        "REMOVE TABLE roles;",
    );
    write_script(
        root,
        "010_auth",
        "0001_create_users_up.surql",
        "DEFINE TABLE users SCHEMAFULL;",
    );
    write_script(
        root,
        "010_auth",
        "0001_create_users_down.surql",
        "REMOVE TABLE users;",
    );
    write_script(
        root,
        "010_auth",
        "0002_create_sessions_up.surql",
        "DEFINE TABLE sessions SCHEMAFULL;",
    );
    write_script(
        root,
        "010_auth",
        "0002_create_sessions_down.surql",
        "REMOVE TABLE sessions;",
    );
}
