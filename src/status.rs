//! Structured workflow reports
//!
//! Every orchestrator workflow returns one of these shapes instead of raising
//! across the boundary, so callers (CLI, automation) branch on data rather
//! than on exception types. Dry runs produce the same shapes as real runs.

use chrono::{DateTime, Utc};

/// Outcome of one file within an execution batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Succeeded { duration_ms: u64 },
    Skipped { reason: String },
    Failed { error: String },
}

/// Per-file entry in an execution report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileResult {
    pub module: String,
    pub filename: String,
    pub outcome: FileOutcome,
}

/// Aggregate result of `execute`
#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    pub dry_run: bool,
    /// Files executed (or, in a dry run, that would have been)
    pub processed: usize,
    /// Files skipped by the applicability gate or missing rollback scripts
    pub skipped: usize,
    pub results: Vec<FileResult>,
}

impl ExecutionReport {
    /// True when no file in the batch failed
    #[must_use]
    pub fn succeeded(&self) -> bool {
        !self
            .results
            .iter()
            .any(|r| matches!(r.outcome, FileOutcome::Failed { .. }))
    }
}

/// Result of the rollback safety validation workflow
#[derive(Debug, Clone, Default)]
pub struct RollbackValidation {
    pub can_rollback: bool,
    /// Modules with live migrations that depend on a rollback target
    pub blocking_modules: Vec<String>,
    pub warnings: Vec<String>,
    /// A negative verdict was overridden by the force flag
    pub forced: bool,
}

/// Per-module status line
#[derive(Debug, Clone)]
pub struct ModuleStatus {
    pub module: String,
    pub applied: usize,
    pub pending: usize,
    pub last_applied_at: Option<DateTime<Utc>>,
    pub dependencies: Vec<String>,
    pub dependents: Vec<String>,
    pub locked: bool,
}

/// Aggregate status report
#[derive(Debug, Clone, Default)]
pub struct StatusReport {
    pub modules: Vec<ModuleStatus>,
    pub total_applied: usize,
    pub total_pending: usize,
}

impl StatusReport {
    /// Check if every discovered migration is applied
    #[must_use]
    pub fn is_up_to_date(&self) -> bool {
        self.total_pending == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_success_flag() {
        let mut report = ExecutionReport::default();
        assert!(report.succeeded());

        report.results.push(FileResult {
            module: "010_auth".to_string(),
            filename: "0001_create_users_up.surql".to_string(),
            outcome: FileOutcome::Succeeded { duration_ms: 3 },
        });
        report.results.push(FileResult {
            module: "010_auth".to_string(),
            filename: "0002_create_sessions_up.surql".to_string(),
            outcome: FileOutcome::Skipped {
                reason: "already applied".to_string(),
            },
        });
        assert!(report.succeeded());

        report.results.push(FileResult {
            module: "010_auth".to_string(),
            filename: "0003_add_index_up.surql".to_string(),
            outcome: FileOutcome::Failed {
                error: "parse error".to_string(),
            },
        });
        assert!(!report.succeeded());
    }

    #[test]
    fn test_status_up_to_date() {
        let report = StatusReport {
            total_pending: 0,
            ..Default::default()
        };
        assert!(report.is_up_to_date());
    }
}
