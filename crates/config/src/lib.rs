//! Configuration loading, validation, and management for turnrelay.
//!
//! Loads configuration from `./turnrelay.toml` (or `$TURNRELAY_CONFIG`) with
//! environment variable overrides. Missing credentials are not an error at
//! load time: the model key is checked per request and the store settings
//! on first store access.

pub mod policy;

pub use policy::{Policy, PolicyError};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Upstream model settings
    #[serde(default)]
    pub model: ModelConfig,

    /// History store and decision log settings
    #[serde(default)]
    pub store: StoreConfig,

    /// HTTP listener settings
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Which policy document is sent as the system prompt
    #[serde(default)]
    pub policy: PolicyConfig,

    #[serde(default)]
    pub escalation: EscalationConfig,

    /// Service identity and request defaults
    #[serde(default)]
    pub service: ServiceConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("model", &self.model)
            .field("store", &self.store)
            .field("gateway", &self.gateway)
            .field("policy", &self.policy)
            .field("escalation", &self.escalation)
            .field("service", &self.service)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Used when a request does not name a model
    #[serde(default = "default_model")]
    pub default_model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Hard budget for the single upstream call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.anthropic.com".into()
}
fn default_model() -> String {
    "claude-sonnet-4-5-20250929".into()
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_timeout_secs() -> u64 {
    60
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            default_model: default_model(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("default_model", &self.default_model)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// When turn writes happen relative to the HTTP response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceMode {
    /// Writes finish before the response is returned; failures are swallowed.
    #[default]
    Awaited,
    /// Writes run on a spawned task; the response never waits for them.
    Detached,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// "rest", "sqlite", "memory" or "none"
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// Base URL of the PostgREST-compatible endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    #[serde(default = "default_turns_table")]
    pub turns_table: String,

    #[serde(default = "default_decisions_table")]
    pub decisions_table: String,

    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,

    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    #[serde(default = "default_true")]
    pub record_decisions: bool,

    #[serde(default)]
    pub persistence: PersistenceMode,
}

fn default_store_backend() -> String {
    "rest".into()
}
fn default_turns_table() -> String {
    "amaru_paty_conversations".into()
}
fn default_decisions_table() -> String {
    "amaru_paty_decisions".into()
}
fn default_sqlite_path() -> String {
    "sqlite://turnrelay.db".into()
}
fn default_history_limit() -> usize {
    20
}
fn default_true() -> bool {
    true
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            url: None,
            key: None,
            turns_table: default_turns_table(),
            decisions_table: default_decisions_table(),
            sqlite_path: default_sqlite_path(),
            history_limit: default_history_limit(),
            record_decisions: true,
            persistence: PersistenceMode::default(),
        }
    }
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("backend", &self.backend)
            .field("url", &self.url)
            .field("key", &redact(&self.key))
            .field("turns_table", &self.turns_table)
            .field("decisions_table", &self.decisions_table)
            .field("sqlite_path", &self.sqlite_path)
            .field("history_limit", &self.history_limit)
            .field("record_decisions", &self.record_decisions)
            .field("persistence", &self.persistence)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "0.0.0.0".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Directory holding `<name>.toml` policy documents
    #[serde(default = "default_policy_dir")]
    pub dir: PathBuf,

    #[serde(default = "default_policy_name")]
    pub active: String,
}

fn default_policy_dir() -> PathBuf {
    PathBuf::from("policies")
}
fn default_policy_name() -> String {
    "default".into()
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            dir: default_policy_dir(),
            active: default_policy_name(),
        }
    }
}

impl PolicyConfig {
    /// Path of the active policy document.
    pub fn active_path(&self) -> PathBuf {
        self.dir.join(format!("{}.toml", self.active))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationConfig {
    /// Parse and strip `<!-- ESCALATE: ... -->` markers from replies
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Machine name reported by `/health`
    #[serde(default = "default_agent")]
    pub agent: String,

    /// Human name reported by `/`
    #[serde(default = "default_display_name")]
    pub display_name: String,

    #[serde(default = "default_user_id")]
    pub default_user_id: String,

    #[serde(default = "default_session_id")]
    pub default_session_id: String,

    /// Heading placed above the query when retrieved context is prepended
    #[serde(default = "default_context_label")]
    pub context_label: String,
}

fn default_agent() -> String {
    "amaru_paty".into()
}
fn default_display_name() -> String {
    "Amaru para Paty".into()
}
fn default_user_id() -> String {
    "paty".into()
}
fn default_session_id() -> String {
    "default".into()
}
fn default_context_label() -> String {
    "Paty's message".into()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            agent: default_agent(),
            display_name: default_display_name(),
            default_user_id: default_user_id(),
            default_session_id: default_session_id(),
            context_label: default_context_label(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `$TURNRELAY_CONFIG` or `./turnrelay.toml`,
    /// then apply environment overrides:
    /// - `ANTHROPIC_API_KEY`
    /// - `STORE_URL` (fallback `SUPABASE_URL`), `STORE_KEY` (fallback `SUPABASE_KEY`)
    /// - `PORT`
    /// - `TURNRELAY_MODEL`, `TURNRELAY_POLICY`, `TURNRELAY_STORE_BACKEND`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = std::env::var("TURNRELAY_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("turnrelay.toml"));
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`. Environment values win
    /// over file values; empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("ANTHROPIC_API_KEY") {
            self.model.api_key = Some(key);
        }
        if let Some(url) = get("STORE_URL").or_else(|| get("SUPABASE_URL")) {
            self.store.url = Some(url);
        }
        if let Some(key) = get("STORE_KEY").or_else(|| get("SUPABASE_KEY")) {
            self.store.key = Some(key);
        }
        if let Some(port) = get("PORT") {
            self.gateway.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::ValidationError(format!("PORT is not a port: {port}")))?;
        }
        if let Some(model) = get("TURNRELAY_MODEL") {
            self.model.default_model = model;
        }
        if let Some(policy) = get("TURNRELAY_POLICY") {
            self.policy.active = policy;
        }
        if let Some(backend) = get("TURNRELAY_STORE_BACKEND") {
            self.store.backend = backend;
        }
        Ok(())
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.gateway.port == 0 {
            return Err(ConfigError::ValidationError("gateway.port must be > 0".into()));
        }
        if self.store.history_limit == 0 {
            return Err(ConfigError::ValidationError(
                "store.history_limit must be >= 1".into(),
            ));
        }
        if self.model.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "model.timeout_secs must be >= 1".into(),
            ));
        }
        if self.model.max_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "model.max_tokens must be >= 1".into(),
            ));
        }
        if !matches!(
            self.store.backend.as_str(),
            "rest" | "sqlite" | "memory" | "none"
        ) {
            return Err(ConfigError::ValidationError(format!(
                "store.backend must be one of rest, sqlite, memory, none (got '{}')",
                self.store.backend
            )));
        }
        Ok(())
    }

    /// Check if the model API key is available.
    pub fn has_api_key(&self) -> bool {
        self.model.api_key.is_some()
    }

    /// Check if the REST store has both URL and key.
    pub fn has_store_credentials(&self) -> bool {
        self.store.url.is_some() && self.store.key.is_some()
    }

    /// Load the active policy document.
    pub fn load_policy(&self) -> Result<Policy, PolicyError> {
        Policy::load(&self.policy.active_path())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
