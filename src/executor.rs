//! `SurrealExecutor` - database execution boundary
//!
//! The engine talks to SurrealDB through this trait only, so tests and
//! alternative transports can substitute their own implementation. The
//! shipping implementation speaks the HTTP `/sql` API with a blocking client.

use crate::error::MigrateError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::Value;
use std::time::Duration;

/// Trait for executing statements against the target database
///
/// `query` accepts named parameters which are bound as `LET` statements ahead
/// of the query text, so callers never interpolate raw values. `create`
/// appends one record to a table. `close` releases whatever the transport
/// holds; it must be safe to call once at the end of a session.
pub trait SurrealExecutor {
    /// Execute a statement and return its result rows
    fn query(&self, statement: &str, params: &[(&str, Value)]) -> Result<Vec<Value>, MigrateError>;

    /// Append one record to a table
    fn create(&self, table: &str, content: &Value) -> Result<(), MigrateError>;

    /// Release the connection
    fn close(&self) -> Result<(), MigrateError>;
}

/// SurrealDB HTTP API executor
///
/// Sends each request to `{url}/sql` with Basic auth and namespace/database
/// headers. The HTTP transport is stateless, so `close()` is a no-op kept for
/// the boundary contract.
pub struct HttpSurrealExecutor {
    endpoint: String,
    auth_header: String,
    namespace: String,
    database: String,
    agent: ureq::Agent,
}

impl HttpSurrealExecutor {
    /// Connect and authenticate against a SurrealDB HTTP endpoint
    ///
    /// Validates the URL shape, then probes the connection with a trivial
    /// query so credential and reachability problems surface here instead of
    /// mid-migration.
    pub fn connect(
        url: &str,
        username: &str,
        password: &str,
        namespace: &str,
        database: &str,
    ) -> Result<Self, MigrateError> {
        validate_connection_url(url)?;

        let credentials = BASE64.encode(format!("{}:{}", username, password));
        let executor = Self {
            endpoint: format!("{}/sql", url.trim_end_matches('/')),
            auth_header: format!("Basic {}", credentials),
            namespace: namespace.to_string(),
            database: database.to_string(),
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(60))
                .build(),
        };

        executor.query("RETURN true;", &[]).map_err(|e| {
            MigrateError::Database(format!("Failed to connect to {}: {}", url, e))
        })?;
        Ok(executor)
    }

    fn send(&self, body: &str) -> Result<Vec<Value>, MigrateError> {
        let response = self
            .agent
            .post(&self.endpoint)
            .set("Accept", "application/json")
            .set("Authorization", &self.auth_header)
            .set("Surreal-NS", &self.namespace)
            .set("Surreal-DB", &self.database)
            // Pre-1.x servers read the short header names
            .set("NS", &self.namespace)
            .set("DB", &self.database)
            .send_string(body)
            .map_err(|e| MigrateError::Database(format!("SurrealDB request failed: {}", e)))?;

        let results: Value = response
            .into_json()
            .map_err(|e| MigrateError::Database(format!("Invalid SurrealDB response: {}", e)))?;

        let Some(statements) = results.as_array() else {
            return Err(MigrateError::Database(format!(
                "Unexpected SurrealDB response shape: {}",
                results
            )));
        };

        for statement in statements {
            let status = statement["status"].as_str().unwrap_or("ERR");
            if status != "OK" {
                let detail = statement["result"]
                    .as_str()
                    .or_else(|| statement["detail"].as_str())
                    .unwrap_or("unknown error");
                return Err(MigrateError::Database(detail.to_string()));
            }
        }

        // Rows of the final statement; LET bindings before it return nulls
        let rows = match statements.last().map(|s| &s["result"]) {
            Some(Value::Array(rows)) => rows.clone(),
            Some(Value::Null) | None => Vec::new(),
            Some(other) => vec![other.clone()],
        };
        Ok(rows)
    }
}

impl SurrealExecutor for HttpSurrealExecutor {
    fn query(&self, statement: &str, params: &[(&str, Value)]) -> Result<Vec<Value>, MigrateError> {
        let mut body = String::new();
        for (name, value) in params {
            body.push_str(&format!("LET ${} = {};\n", name, value));
        }
        body.push_str(statement);
        if !statement.trim_end().ends_with(';') {
            body.push(';');
        }
        self.send(&body)
    }

    fn create(&self, table: &str, content: &Value) -> Result<(), MigrateError> {
        self.query(
            "CREATE type::table($basalt_table) CONTENT $basalt_content;",
            &[
                ("basalt_table", Value::String(table.to_string())),
                ("basalt_content", content.clone()),
            ],
        )
        .map(|_| ())
    }

    fn close(&self) -> Result<(), MigrateError> {
        Ok(())
    }
}

/// Validate a SurrealDB HTTP endpoint URL
///
/// The HTTP executor accepts `http://` and `https://` endpoints only.
pub fn validate_connection_url(url: &str) -> Result<(), MigrateError> {
    if url.is_empty() {
        return Err(MigrateError::Config(
            "Connection URL cannot be empty".to_string(),
        ));
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(MigrateError::Config(format!(
            "Connection URL must start with http:// or https://, got '{}'",
            url
        )));
    }
    Ok(())
}
