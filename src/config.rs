//! Connection settings resolution
//!
//! Explicit values (CLI flags, host options) take precedence; anything left
//! unset falls back to `config/basalt.toml` and `BASALT_*` environment
//! variables. Resolution fails with one aggregated error naming every setting
//! still missing afterwards.

use crate::error::MigrateError;
use config::{Config, Environment, File};
use serde::Deserialize;

/// Partially resolved connection settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectionSettings {
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub namespace: Option<String>,
    pub database: Option<String>,
}

/// Fully resolved connection settings
#[derive(Debug, Clone)]
pub struct ResolvedConnection {
    pub url: String,
    pub username: String,
    pub password: String,
    pub namespace: String,
    pub database: String,
}

impl ConnectionSettings {
    /// Load fallback values from `config/basalt.toml` and `BASALT_*` env vars
    pub fn load() -> Result<Self, MigrateError> {
        let settings = Config::builder()
            .add_source(File::with_name("config/basalt").required(false))
            .add_source(Environment::with_prefix("BASALT"))
            .build()
            .map_err(|e| {
                MigrateError::Config(format!("Failed to load connection settings: {}", e))
            })?;

        settings.try_deserialize().map_err(|e| {
            MigrateError::Config(format!("Invalid connection settings: {}", e))
        })
    }

    /// Merge explicit overrides over these fallbacks and require completeness
    pub fn resolve(self, overrides: &ConnectionSettings) -> Result<ResolvedConnection, MigrateError> {
        let url = overrides.url.clone().or(self.url);
        let username = overrides.username.clone().or(self.username);
        let password = overrides.password.clone().or(self.password);
        let namespace = overrides.namespace.clone().or(self.namespace);
        let database = overrides.database.clone().or(self.database);

        match (url, username, password, namespace, database) {
            (Some(url), Some(username), Some(password), Some(namespace), Some(database)) => {
                Ok(ResolvedConnection {
                    url,
                    username,
                    password,
                    namespace,
                    database,
                })
            }
            (url, username, password, namespace, database) => {
                let mut missing = Vec::new();
                if url.is_none() {
                    missing.push("url (BASALT_URL)");
                }
                if username.is_none() {
                    missing.push("username (BASALT_USERNAME)");
                }
                if password.is_none() {
                    missing.push("password (BASALT_PASSWORD)");
                }
                if namespace.is_none() {
                    missing.push("namespace (BASALT_NAMESPACE)");
                }
                if database.is_none() {
                    missing.push("database (BASALT_DATABASE)");
                }
                Err(MigrateError::Config(format!(
                    "Missing required connection settings: {}",
                    missing.join(", ")
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full() -> ConnectionSettings {
        ConnectionSettings {
            url: Some("http://localhost:8000".to_string()),
            username: Some("root".to_string()),
            password: Some("root".to_string()),
            namespace: Some("app".to_string()),
            database: Some("main".to_string()),
        }
    }

    #[test]
    fn test_overrides_win() {
        let fallback = full();
        let overrides = ConnectionSettings {
            url: Some("http://db.internal:8000".to_string()),
            ..Default::default()
        };
        let resolved = fallback.resolve(&overrides).unwrap();
        assert_eq!(resolved.url, "http://db.internal:8000");
        assert_eq!(resolved.username, "root");
    }

    #[test]
    fn test_missing_settings_aggregated() {
        let fallback = ConnectionSettings {
            url: Some("http://localhost:8000".to_string()),
            ..Default::default()
        };
        let err = fallback.resolve(&ConnectionSettings::default()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("username"));
        assert!(message.contains("password"));
        assert!(message.contains("namespace"));
        assert!(message.contains("database"));
        assert!(!message.contains("url (BASALT_URL)"));
    }
}
