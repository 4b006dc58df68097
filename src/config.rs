// src/config.rs

use std::{env, fmt, time::Duration};

use dotenvy::dotenv;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub rust_log: String,
    pub server_addr: String,
    pub db_max_connections: u32,
    pub operation_timeout: Duration,
    pub max_subtree_nodes: usize,
    pub cors_origins: Vec<String>,
}

/// Startup configuration problems.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid { key: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "{key} must be set"),
            ConfigError::Invalid { key, value } => write!(f, "{key} has invalid value '{value}'"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let rust_log = lookup("RUST_LOG").unwrap_or_else(|| "info".to_string());

        let server_addr = lookup("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string());

        let db_max_connections = parse_or(&lookup, "DB_MAX_CONNECTIONS", 5)?;

        let timeout_ms: u64 = parse_or(&lookup, "OPERATION_TIMEOUT_MS", 5_000)?;

        let max_subtree_nodes = parse_or(&lookup, "MAX_SUBTREE_NODES", 10_000)?;

        let cors_origins = lookup("CORS_ORIGINS")
            .unwrap_or_else(|| "http://localhost:3000".to_string())
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect();

        Ok(Self {
            database_url,
            rust_log,
            server_addr,
            db_max_connections,
            operation_timeout: Duration::from_millis(timeout_ms),
            max_subtree_nodes,
            cors_origins,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply() {
        let config = Config::from_lookup(lookup_from(&[("DATABASE_URL", "sqlite::memory:")])).unwrap();
        assert_eq!(config.rust_log, "info");
        assert_eq!(config.server_addr, "0.0.0.0:3000");
        assert_eq!(config.db_max_connections, 5);
        assert_eq!(config.operation_timeout, Duration::from_secs(5));
        assert_eq!(config.max_subtree_nodes, 10_000);
        assert_eq!(config.cors_origins, vec!["http://localhost:3000".to_string()]);
    }

    #[test]
    fn database_url_is_required() {
        let err = Config::from_lookup(lookup_from(&[])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("DATABASE_URL"));
    }

    #[test]
    fn overrides_and_invalid_numbers() {
        let config = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/comments"),
            ("OPERATION_TIMEOUT_MS", "250"),
            ("CORS_ORIGINS", "http://a.test, http://b.test,"),
        ]))
        .unwrap();
        assert_eq!(config.operation_timeout, Duration::from_millis(250));
        assert_eq!(config.cors_origins.len(), 2);

        let err = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/comments"),
            ("MAX_SUBTREE_NODES", "lots"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "MAX_SUBTREE_NODES", .. }));
    }
}
