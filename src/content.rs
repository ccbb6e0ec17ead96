//! Script content processing
//!
//! Transforms raw SurrealQL before execution: `${VAR}` substitution from an
//! environment snapshot, namespace/database scope injection, and transaction
//! wrapping. The transform is total and deterministic for a given input and
//! context; the checksum of its output feeds the audit trail.

use crate::error::MigrateError;
use crate::manifest::ManifestSettings;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static VAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder regex"));

// Leading DEFINE/REMOVE (after whitespace and -- comments) marks a schema
// script; SurrealDB rejects DDL inside explicit transactions
static SCHEMA_STMT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:--[^\n]*\n\s*)*(?:DEFINE|REMOVE)\b").expect("schema statement regex")
});

static BEGIN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bBEGIN\s+TRANSACTION\b").expect("begin regex"));

static USE_NS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bUSE\s+NS\b").expect("use ns regex"));

static USE_DB_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bUSE\s+DB\b").expect("use db regex"));

/// Scoping context for one processing run
#[derive(Debug, Clone, Default)]
pub struct ScopeContext {
    pub namespace: Option<String>,
    pub database: Option<String>,
    pub use_transactions: bool,
}

impl ScopeContext {
    #[must_use]
    pub fn from_settings(settings: &ManifestSettings) -> Self {
        Self {
            namespace: settings.default_namespace.clone(),
            database: settings.default_database.clone(),
            use_transactions: settings.use_transactions(),
        }
    }
}

/// Deterministic script content transformer
///
/// Holds an environment snapshot taken at construction so a processing run
/// never observes a mutating environment.
#[derive(Debug, Clone)]
pub struct ContentProcessor {
    env: HashMap<String, String>,
}

impl ContentProcessor {
    #[must_use]
    pub fn new(env: HashMap<String, String>) -> Self {
        Self { env }
    }

    /// Snapshot the process environment
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(std::env::vars().collect())
    }

    /// Run the full pipeline: substitution, scope injection, wrapping
    pub fn process(&self, content: &str, ctx: &ScopeContext) -> Result<String, MigrateError> {
        let body = self.substitute_variables(content)?;

        let mut prefix = String::new();
        if let Some(namespace) = &ctx.namespace {
            if !USE_NS_RE.is_match(&body) {
                prefix.push_str(&format!("USE NS {};\n", namespace));
            }
        }
        if let Some(database) = &ctx.database {
            if !USE_DB_RE.is_match(&body) {
                prefix.push_str(&format!("USE DB {};\n", database));
            }
        }

        let body = if Self::should_wrap(&body, ctx) {
            format!("BEGIN TRANSACTION;\n{}\nCOMMIT TRANSACTION;", body.trim_end())
        } else {
            body
        };

        Ok(format!("{}{}", prefix, body))
    }

    /// Replace `${VAR}` placeholders from the environment snapshot
    ///
    /// All undefined variables are collected and reported in one error.
    pub fn substitute_variables(&self, content: &str) -> Result<String, MigrateError> {
        let mut missing: Vec<String> = Vec::new();
        for caps in VAR_RE.captures_iter(content) {
            let name = &caps[1];
            if !self.env.contains_key(name) && !missing.iter().any(|m| m == name) {
                missing.push(name.to_string());
            }
        }
        if !missing.is_empty() {
            return Err(MigrateError::UndefinedVariable(missing.join(", ")));
        }

        let replaced = VAR_RE.replace_all(content, |caps: &regex::Captures<'_>| {
            self.env[&caps[1]].clone()
        });
        Ok(replaced.into_owned())
    }

    fn should_wrap(body: &str, ctx: &ScopeContext) -> bool {
        ctx.use_transactions && !SCHEMA_STMT_RE.is_match(body) && !BEGIN_RE.is_match(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processor_with(vars: &[(&str, &str)]) -> ContentProcessor {
        ContentProcessor::new(
            vars.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    fn ctx(namespace: Option<&str>, database: Option<&str>, transactions: bool) -> ScopeContext {
        ScopeContext {
            namespace: namespace.map(str::to_string),
            database: database.map(str::to_string),
            use_transactions: transactions,
        }
    }

    #[test]
    fn test_schema_scripts_are_never_wrapped() {
        let processor = processor_with(&[]);
        let out = processor
            .process("DEFINE TABLE users;", &ctx(Some("ns"), None, true))
            .unwrap();
        assert_eq!(out, "USE NS ns;\nDEFINE TABLE users;");

        // Leading comment does not hide the DEFINE
        let out = processor
            .process("-- users table\nDEFINE TABLE users;", &ctx(None, None, true))
            .unwrap();
        assert!(!out.contains("BEGIN TRANSACTION"));

        let out = processor
            .process("REMOVE TABLE users;", &ctx(None, None, true))
            .unwrap();
        assert!(!out.contains("BEGIN TRANSACTION"));
    }

    #[test]
    fn test_data_scripts_are_wrapped() {
        let processor = processor_with(&[]);
        let out = processor
            .process("UPDATE users SET active = true;", &ctx(None, None, true))
            .unwrap();
        assert_eq!(
            out,
            "BEGIN TRANSACTION;\nUPDATE users SET active = true;\nCOMMIT TRANSACTION;"
        );
    }

    #[test]
    fn test_explicit_transaction_not_rewrapped() {
        let processor = processor_with(&[]);
        let content = "BEGIN TRANSACTION;\nUPDATE users SET active = true;\nCOMMIT TRANSACTION;";
        let out = processor.process(content, &ctx(None, None, true)).unwrap();
        assert_eq!(out, content);
    }

    #[test]
    fn test_wrapping_disabled() {
        let processor = processor_with(&[]);
        let out = processor
            .process("UPDATE users SET active = true;", &ctx(None, None, false))
            .unwrap();
        assert!(!out.contains("BEGIN TRANSACTION"));
    }

    #[test]
    fn test_scope_injection_skipped_when_present() {
        let processor = processor_with(&[]);
        let content = "USE NS other;\nUSE DB main;\nDEFINE TABLE users;";
        let out = processor
            .process(content, &ctx(Some("ns"), Some("db"), true))
            .unwrap();
        assert_eq!(out, content);
    }

    #[test]
    fn test_database_scope_injected_separately() {
        let processor = processor_with(&[]);
        let out = processor
            .process("DEFINE TABLE users;", &ctx(Some("ns"), Some("db"), true))
            .unwrap();
        assert!(out.starts_with("USE NS ns;\nUSE DB db;\n"));
    }

    #[test]
    fn test_variable_substitution() {
        let processor = processor_with(&[("ADMIN_PASS", "s3cret")]);
        let out = processor
            .substitute_variables("DEFINE USER admin PASSWORD '${ADMIN_PASS}';")
            .unwrap();
        assert_eq!(out, "DEFINE USER admin PASSWORD 's3cret';");
    }

    #[test]
    fn test_undefined_variables_collected() {
        let processor = processor_with(&[]);
        let err = processor
            .substitute_variables("${FIRST} and ${SECOND} and ${FIRST}")
            .unwrap_err();
        match err {
            MigrateError::UndefinedVariable(names) => assert_eq!(names, "FIRST, SECOND"),
            other => panic!("expected UndefinedVariable, got {:?}", other),
        }
    }

    #[test]
    fn test_processing_is_deterministic() {
        let processor = processor_with(&[("V", "x")]);
        let context = ctx(Some("ns"), None, true);
        let a = processor.process("UPDATE t SET v = '${V}';", &context).unwrap();
        let b = processor.process("UPDATE t SET v = '${V}';", &context).unwrap();
        assert_eq!(a, b);
    }
}
