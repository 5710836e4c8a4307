// Runtime configuration, read from FLAT_LEDGER_* environment variables

use std::net::SocketAddr;
use std::path::PathBuf;

use crate::error::{LedgerError, Result};
use crate::grouping::Adjacency;
use crate::seed;

pub const ENV_DB: &str = "FLAT_LEDGER_DB";
pub const ENV_BIND: &str = "FLAT_LEDGER_BIND";
pub const ENV_EXPECTED_FEE: &str = "FLAT_LEDGER_EXPECTED_FEE";
pub const ENV_ADJACENCY: &str = "FLAT_LEDGER_ADJACENCY";
pub const ENV_LOG_JSON: &str = "FLAT_LEDGER_LOG_JSON";

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub bind_addr: SocketAddr,
    pub expected_fee: f64,
    /// JSON adjacency file; the sample floors are used when unset
    pub adjacency_path: Option<PathBuf>,
    pub log_json: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            database_path: PathBuf::from("flat_ledger.db"),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            expected_fee: seed::SAMPLE_FEE,
            adjacency_path: None,
            log_json: false,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key -> value source; unset keys keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = AppConfig::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(path) = get(ENV_DB) {
            config.database_path = PathBuf::from(path);
        }
        if let Some(addr) = get(ENV_BIND) {
            config.bind_addr = addr
                .parse()
                .map_err(|e| LedgerError::Config(format!("{ENV_BIND}={addr:?}: {e}")))?;
        }
        if let Some(fee) = get(ENV_EXPECTED_FEE) {
            let parsed: f64 = fee
                .parse()
                .map_err(|e| LedgerError::Config(format!("{ENV_EXPECTED_FEE}={fee:?}: {e}")))?;
            if !parsed.is_finite() || parsed < 0.0 {
                return Err(LedgerError::Config(format!(
                    "{ENV_EXPECTED_FEE} must be a non-negative number, got {fee}"
                )));
            }
            config.expected_fee = parsed;
        }
        if let Some(path) = get(ENV_ADJACENCY) {
            config.adjacency_path = Some(PathBuf::from(path));
        }
        if let Some(flag) = get(ENV_LOG_JSON) {
            config.log_json = parse_bool(&flag).ok_or_else(|| {
                LedgerError::Config(format!("{ENV_LOG_JSON}={flag:?} is not a boolean"))
            })?;
        }

        Ok(config)
    }

    /// The configured adjacency relation
    pub fn load_adjacency(&self) -> Result<Adjacency> {
        match &self.adjacency_path {
            Some(path) => Adjacency::load(path),
            None => seed::sample_adjacency(),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
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
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.bind_addr.port(), 5000);
        assert_eq!(config.expected_fee, 1500.0);
        assert_eq!(config.load_adjacency().unwrap().len(), 8);
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            (ENV_DB, "/tmp/ledger.db"),
            (ENV_BIND, "127.0.0.1:8080"),
            (ENV_EXPECTED_FEE, "2000"),
            (ENV_LOG_JSON, "true"),
        ]))
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/ledger.db"));
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.expected_fee, 2000.0);
        assert!(config.log_json);
    }

    #[test]
    fn test_invalid_values_rejected() {
        for pairs in [
            [(ENV_BIND, "not-an-address")],
            [(ENV_EXPECTED_FEE, "-10")],
            [(ENV_EXPECTED_FEE, "lots")],
            [(ENV_LOG_JSON, "maybe")],
        ] {
            assert!(matches!(
                AppConfig::from_lookup(lookup(&pairs)),
                Err(LedgerError::Config(_))
            ));
        }
    }

    #[test]
    fn test_adjacency_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        std::fs::write(&path, r#"{"A1": ["A2"], "A2": ["A1"], "B1": []}"#).unwrap();

        let config =
            AppConfig::from_lookup(lookup(&[(ENV_ADJACENCY, path.to_str().unwrap())])).unwrap();
        let adjacency = config.load_adjacency().unwrap();
        assert_eq!(adjacency.vertices().collect::<Vec<_>>(), vec!["A1", "A2", "B1"]);

        let missing = AppConfig {
            adjacency_path: Some(dir.path().join("missing.json")),
            ..AppConfig::default()
        };
        assert!(matches!(missing.load_adjacency(), Err(LedgerError::Config(_))));

        let empty_path = dir.path().join("empty.json");
        std::fs::write(&empty_path, "{}").unwrap();
        let empty = AppConfig {
            adjacency_path: Some(empty_path),
            ..AppConfig::default()
        };
        assert!(matches!(empty.load_adjacency(), Err(LedgerError::Config(_))));
    }
}
