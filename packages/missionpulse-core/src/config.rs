//! Service configuration.
//!
//! Supports TOML config files, environment variable overrides, and defaults.
//! The server binary layers command-line flags on top.

use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "MISSIONPULSE_";

/// Configuration loading and validation failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(String),

    #[error("Invalid TOML: {0}")]
    Parse(String),

    #[error("Invalid {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Row store backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process tables, lost on restart
    Memory,
    /// Hosted datastore over PostgREST
    Postgrest,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "postgrest" | "supabase" => Ok(StoreBackend::Postgrest),
            other => Err(format!("unknown store backend '{}'", other)),
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackend::Memory => f.write_str("memory"),
            StoreBackend::Postgrest => f.write_str("postgrest"),
        }
    }
}

/// Audit sink backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditBackend {
    /// `audit_logs` table in the row store
    Table,
    /// Local JSON-lines file
    Jsonl,
}

impl FromStr for AuditBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "table" => Ok(AuditBackend::Table),
            "jsonl" => Ok(AuditBackend::Jsonl),
            other => Err(format!("unknown audit backend '{}'", other)),
        }
    }
}

impl fmt::Display for AuditBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditBackend::Table => f.write_str("table"),
            AuditBackend::Jsonl => f.write_str("jsonl"),
        }
    }
}

/// A bearer token and the actor it authenticates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConfig {
    pub token: String,
    pub actor_id: String,
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default = "default_org_type")]
    pub org_type: String,
}

fn default_role() -> String {
    "viewer".to_string()
}

fn default_org_type() -> String {
    "internal".to_string()
}

/// MissionPulse API service configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Bind host (default: 127.0.0.1)
    pub host: String,
    /// Bind port (default: 8000)
    pub port: u16,
    /// Request body read timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Bound on each row store / audit sink call in milliseconds
    pub store_timeout_ms: u64,
    /// Rows read by the pipeline statistics endpoint
    pub stats_window: usize,
    /// Audit log listing limit when the caller gives none
    pub audit_limit_default: usize,
    /// Largest audit log listing limit honored
    pub audit_limit_cap: usize,
    /// CORS origins; a single `*` label acts as a wildcard
    pub allowed_origins: Vec<String>,
    /// Row store backend
    pub store: StoreBackend,
    /// PostgREST base URL (postgrest backend)
    pub postgrest_url: Option<String>,
    /// PostgREST service key (postgrest backend)
    pub postgrest_key: Option<String>,
    /// Audit sink backend
    pub audit: AuditBackend,
    /// Trail file path (jsonl audit backend)
    pub audit_log_path: Option<PathBuf>,
    /// Accepted bearer tokens
    pub tokens: Vec<TokenConfig>,
    /// Development only: authenticate every request as this actor id
    pub dev_actor: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            request_timeout_ms: 5000,
            store_timeout_ms: 10000,
            stats_window: 200,
            audit_limit_default: 50,
            audit_limit_cap: 200,
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:8501".to_string(),
                "https://missionpulse.netlify.app".to_string(),
                "https://*.netlify.app".to_string(),
            ],
            store: StoreBackend::Memory,
            postgrest_url: None,
            postgrest_key: None,
            audit: AuditBackend::Table,
            audit_log_path: None,
            tokens: Vec::new(),
            dev_actor: None,
        }
    }
}

impl ServiceConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Applies environment variable overrides.
    ///
    /// Variables are prefixed with `MISSIONPULSE_`, e.g. `MISSIONPULSE_PORT=9000`.
    /// `MISSIONPULSE_ALLOWED_ORIGINS` is comma separated.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| env::var(format!("{}{}", ENV_PREFIX, key)).ok())
    }

    /// Applies overrides from a key lookup (keys without prefix).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("HOST") {
            self.host = val;
        }
        if let Some(val) = lookup("PORT") {
            self.port = parse_value("port", &val)?;
        }
        if let Some(val) = lookup("REQUEST_TIMEOUT_MS") {
            self.request_timeout_ms = parse_value("request_timeout_ms", &val)?;
        }
        if let Some(val) = lookup("STORE_TIMEOUT_MS") {
            self.store_timeout_ms = parse_value("store_timeout_ms", &val)?;
        }
        if let Some(val) = lookup("STATS_WINDOW") {
            self.stats_window = parse_value("stats_window", &val)?;
        }
        if let Some(val) = lookup("AUDIT_LIMIT_DEFAULT") {
            self.audit_limit_default = parse_value("audit_limit_default", &val)?;
        }
        if let Some(val) = lookup("AUDIT_LIMIT_CAP") {
            self.audit_limit_cap = parse_value("audit_limit_cap", &val)?;
        }
        if let Some(val) = lookup("ALLOWED_ORIGINS") {
            self.allowed_origins = val
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(val) = lookup("STORE") {
            self.store = parse_value("store", &val)?;
        }
        if let Some(val) = lookup("POSTGREST_URL") {
            self.postgrest_url = Some(val);
        }
        if let Some(val) = lookup("POSTGREST_KEY") {
            self.postgrest_key = Some(val);
        }
        if let Some(val) = lookup("AUDIT") {
            self.audit = parse_value("audit", &val)?;
        }
        if let Some(val) = lookup("AUDIT_LOG_PATH") {
            self.audit_log_path = Some(PathBuf::from(val));
        }
        if let Some(val) = lookup("DEV_ACTOR") {
            self.dev_actor = Some(val).filter(|v| !v.is_empty());
        }
        Ok(())
    }

    /// Checks cross-field consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("host must not be empty".into()));
        }
        if self.request_timeout_ms == 0 || self.store_timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeouts must be positive".into()));
        }
        if self.stats_window == 0 {
            return Err(ConfigError::Invalid("stats_window must be positive".into()));
        }
        if self.audit_limit_default == 0 || self.audit_limit_default > self.audit_limit_cap {
            return Err(ConfigError::Invalid(format!(
                "audit_limit_default must be between 1 and audit_limit_cap ({})",
                self.audit_limit_cap
            )));
        }
        if self.store == StoreBackend::Postgrest
            && (is_blank(&self.postgrest_url) || is_blank(&self.postgrest_key))
        {
            return Err(ConfigError::Invalid(
                "postgrest store requires postgrest_url and postgrest_key".into(),
            ));
        }
        if self.audit == AuditBackend::Jsonl && self.audit_log_path.is_none() {
            return Err(ConfigError::Invalid(
                "jsonl audit requires audit_log_path".into(),
            ));
        }
        if let Some(dup) = self
            .tokens
            .iter()
            .enumerate()
            .find(|(i, t)| self.tokens[..*i].iter().any(|o| o.token == t.token))
        {
            return Err(ConfigError::Invalid(format!(
                "duplicate token for actor '{}'",
                dup.1.actor_id
            )));
        }
        Ok(())
    }

    /// Socket address to bind.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| ConfigError::InvalidValue {
                field: "host".into(),
                value: format!("{}:{}", self.host, self.port),
            })
    }

    /// Returns the request body timeout as a `Duration`.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Returns the collaborator call timeout as a `Duration`.
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

fn parse_value<T: FromStr>(field: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = ServiceConfig::default();
        assert_eq!(config.port, 8000);
        assert_eq!(config.stats_window, 200);
        assert_eq!(config.store, StoreBackend::Memory);
        assert!(config.allowed_origins.contains(&"https://*.netlify.app".to_string()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_partial() {
        let toml = r#"
            port = 9100
            store = "postgrest"
            postgrest_url = "https://example.supabase.co"
            postgrest_key = "service-key"
            audit = "jsonl"
            audit_log_path = "/var/log/missionpulse/audit.jsonl"

            [[tokens]]
            token = "abc"
            actor_id = "exec_001"
            role = "executive"
        "#;
        let config = ServiceConfig::from_toml(toml).unwrap();
        assert_eq!(config.port, 9100);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.store, StoreBackend::Postgrest);
        assert_eq!(config.audit, AuditBackend::Jsonl);
        assert_eq!(config.tokens.len(), 1);
        assert_eq!(config.tokens[0].org_type, "internal");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_rejects_unknown_backend() {
        let err = ServiceConfig::from_toml(r#"store = "oracle""#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missionpulse.toml");
        std::fs::write(&path, "stats_window = 50\n").unwrap();
        let config = ServiceConfig::from_file(&path).unwrap();
        assert_eq!(config.stats_window, 50);

        let missing = ServiceConfig::from_file(dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("PORT", "9000"),
            ("ALLOWED_ORIGINS", "http://a.test, https://*.b.test"),
            ("AUDIT", "jsonl"),
            ("AUDIT_LOG_PATH", "audit.jsonl"),
            ("DEV_ACTOR", "dev_user"),
        ]
        .into_iter()
        .collect();

        let mut config = ServiceConfig::default();
        config
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(
            config.allowed_origins,
            vec!["http://a.test".to_string(), "https://*.b.test".to_string()]
        );
        assert_eq!(config.audit, AuditBackend::Jsonl);
        assert_eq!(config.dev_actor.as_deref(), Some("dev_user"));
    }

    #[test]
    fn test_override_bad_number() {
        let mut config = ServiceConfig::default();
        let err = config
            .apply_overrides(|key| (key == "PORT").then(|| "eighty".to_string()))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                field: "port".into(),
                value: "eighty".into()
            }
        );
    }

    #[test]
    fn test_validate_backend_requirements() {
        let mut config = ServiceConfig {
            store: StoreBackend::Postgrest,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        config.postgrest_url = Some("https://x.supabase.co".into());
        config.postgrest_key = Some("k".into());
        assert!(config.validate().is_ok());

        config.audit = AuditBackend::Jsonl;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_limits_and_tokens() {
        let config = ServiceConfig {
            audit_limit_default: 300,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let token = TokenConfig {
            token: "t".into(),
            actor_id: "a".into(),
            role: default_role(),
            org_type: default_org_type(),
        };
        let config = ServiceConfig {
            tokens: vec![token.clone(), token],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_socket_addr() {
        let config = ServiceConfig::default();
        assert_eq!(config.socket_addr().unwrap().port(), 8000);

        let bad = ServiceConfig {
            host: "not a host".into(),
            ..Default::default()
        };
        assert!(bad.socket_addr().is_err());
    }
}
