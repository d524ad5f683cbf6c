use std::env;

use crate::utils::RetryConfig;

// ============================================================================
// Configuration
// ============================================================================
//
// Read from the environment with defaults suitable for a local ScyllaDB:
// - DOCSTORE_BACKEND           memory | scylla            (default: memory)
// - SCYLLA_NODES               comma-separated host:port  (default: 127.0.0.1:9042)
// - SCYLLA_KEYSPACE            keyspace for documents     (default: docstore_ks)
// - SCYLLA_REPLICATION_FACTOR  SimpleStrategy factor      (default: 1)
// - DOCSTORE_CONNECT_ATTEMPTS  connection attempts        (default: 5)
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unknown store backend `{0}` (expected `memory` or `scylla`)")]
    UnknownBackend(String),

    #[error("Invalid value `{value}` for {key}: expected a positive integer")]
    InvalidNumber { key: &'static str, value: String },

    #[error("SCYLLA_NODES must name at least one node")]
    NoNodes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Memory,
    Scylla,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScyllaConfig {
    pub known_nodes: Vec<String>,
    pub keyspace: String,
    pub replication_factor: u32,
    pub connect_retry: RetryConfig,
}

impl Default for ScyllaConfig {
    fn default() -> Self {
        Self {
            known_nodes: vec!["127.0.0.1:9042".to_string()],
            keyspace: "docstore_ks".to_string(),
            replication_factor: 1,
            connect_retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    pub backend: Backend,
    pub scylla: ScyllaConfig,
}

impl StoreConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup, so tests need not touch the process env.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend = match lookup("DOCSTORE_BACKEND").as_deref().map(str::trim) {
            None | Some("") | Some("memory") => Backend::Memory,
            Some("scylla") => Backend::Scylla,
            Some(other) => return Err(ConfigError::UnknownBackend(other.to_string())),
        };

        let mut scylla = ScyllaConfig::default();

        if let Some(nodes) = lookup("SCYLLA_NODES") {
            scylla.known_nodes = nodes
                .split(',')
                .map(str::trim)
                .filter(|node| !node.is_empty())
                .map(str::to_string)
                .collect();
            if scylla.known_nodes.is_empty() {
                return Err(ConfigError::NoNodes);
            }
        }

        if let Some(keyspace) = lookup("SCYLLA_KEYSPACE").filter(|k| !k.trim().is_empty()) {
            scylla.keyspace = keyspace.trim().to_string();
        }

        if let Some(value) = lookup("SCYLLA_REPLICATION_FACTOR") {
            scylla.replication_factor = parse_positive("SCYLLA_REPLICATION_FACTOR", &value)?;
        }

        if let Some(value) = lookup("DOCSTORE_CONNECT_ATTEMPTS") {
            scylla.connect_retry.max_attempts = parse_positive("DOCSTORE_CONNECT_ATTEMPTS", &value)?;
        }

        Ok(Self { backend, scylla })
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Memory,
            scylla: ScyllaConfig::default(),
        }
    }
}

fn parse_positive(key: &'static str, value: &str) -> Result<u32, ConfigError> {
    match value.trim().parse::<u32>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        _ => Err(ConfigError::InvalidNumber {
            key,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_env_is_empty() {
        let config = StoreConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, StoreConfig::default());
    }

    #[test]
    fn test_scylla_settings_are_read() {
        let config = StoreConfig::from_lookup(lookup(&[
            ("DOCSTORE_BACKEND", "scylla"),
            ("SCYLLA_NODES", "10.0.0.1:9042, 10.0.0.2:9042"),
            ("SCYLLA_KEYSPACE", "people_ks"),
            ("SCYLLA_REPLICATION_FACTOR", "3"),
            ("DOCSTORE_CONNECT_ATTEMPTS", "2"),
        ]))
        .unwrap();

        assert_eq!(config.backend, Backend::Scylla);
        assert_eq!(config.scylla.known_nodes, vec!["10.0.0.1:9042", "10.0.0.2:9042"]);
        assert_eq!(config.scylla.keyspace, "people_ks");
        assert_eq!(config.scylla.replication_factor, 3);
        assert_eq!(config.scylla.connect_retry.max_attempts, 2);
    }

    #[test]
    fn test_rejects_unknown_backend() {
        let err = StoreConfig::from_lookup(lookup(&[("DOCSTORE_BACKEND", "mongo")])).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownBackend(ref b) if b == "mongo"));
    }

    #[test]
    fn test_rejects_bad_numbers_and_empty_nodes() {
        assert!(matches!(
            StoreConfig::from_lookup(lookup(&[("SCYLLA_REPLICATION_FACTOR", "0")])),
            Err(ConfigError::InvalidNumber { .. })
        ));
        assert!(matches!(
            StoreConfig::from_lookup(lookup(&[("SCYLLA_NODES", " , ")])),
            Err(ConfigError::NoNodes)
        ));
    }
}
