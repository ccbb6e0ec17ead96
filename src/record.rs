//! `MigrationRecord` - rows in the `basalt_migrations` history table

use crate::error::MigrateError;
use crate::file::Direction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Outcome of one execution attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Fail,
}

impl ExecutionStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Success => "success",
            ExecutionStatus::Fail => "fail",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One persisted execution attempt
///
/// Records are append-only: the current applied state of a (module, number,
/// name) triple is derived from its most recent record, never from an updated
/// row. `applied_at` is stored as RFC 3339 text, which orders chronologically
/// under lexicographic sort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub module: String,
    pub number: u32,
    pub name: String,
    pub direction: Direction,
    pub filename: String,
    pub path: String,
    /// Content snapshot exactly as sent to the database
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    pub status: ExecutionStatus,
    pub applied_by: String,
    pub applied_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
}

impl MigrationRecord {
    /// Whether this record marks its migration as currently applied
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.direction == Direction::Up && self.status == ExecutionStatus::Success
    }

    /// Parse a record from a database row
    pub fn from_row(row: &Value) -> Result<Self, MigrateError> {
        serde_json::from_value(row.clone()).map_err(|e| {
            MigrateError::Database(format!("Failed to parse migration record row: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_round_trip() {
        let record = MigrationRecord {
            module: "010_auth".to_string(),
            number: 1,
            name: "create_users".to_string(),
            direction: Direction::Up,
            filename: "0001_create_users_up.surql".to_string(),
            path: "migrations/010_auth/0001_create_users_up.surql".to_string(),
            content: "DEFINE TABLE users;".to_string(),
            checksum: Some("abc".to_string()),
            status: ExecutionStatus::Success,
            applied_by: "root".to_string(),
            applied_at: "2026-01-02T03:04:05Z".parse().unwrap(),
            execution_time_ms: Some(12),
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["direction"], "up");
        assert_eq!(value["status"], "success");

        let parsed = MigrationRecord::from_row(&value).unwrap();
        assert_eq!(parsed, record);
        assert!(parsed.is_live());
    }

    #[test]
    fn test_from_row_ignores_database_id() {
        let row = json!({
            "id": "basalt_migrations:abc123",
            "module": "010_auth",
            "number": 2,
            "name": "create_sessions",
            "direction": "down",
            "filename": "0002_create_sessions_down.surql",
            "path": "migrations/010_auth/0002_create_sessions_down.surql",
            "content": "REMOVE TABLE sessions;",
            "status": "success",
            "applied_by": "root",
            "applied_at": "2026-01-02T03:04:05Z"
        });
        let record = MigrationRecord::from_row(&row).unwrap();
        assert_eq!(record.number, 2);
        assert_eq!(record.direction, Direction::Down);
        assert!(record.checksum.is_none());
        assert!(!record.is_live());
    }

    #[test]
    fn test_from_row_rejects_malformed() {
        let row = json!({ "module": "010_auth" });
        assert!(MigrationRecord::from_row(&row).is_err());
    }
}
