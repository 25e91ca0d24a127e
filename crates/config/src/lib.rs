//! Configuration loading, validation, and management for hassAI.
//!
//! Loads configuration from `~/.hassai/config.toml` (or `$HASSAI_CONFIG`),
//! then applies environment variable overrides, including any set through a
//! `.env` file in the working directory. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.hassai/config.toml`.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP listener and caller authentication
    #[serde(default)]
    pub server: ServerConfig,

    /// Completion service settings
    #[serde(default)]
    pub openrouter: OpenRouterConfig,

    /// Tool service settings
    #[serde(default)]
    pub home_assistant: HomeAssistantConfig,

    /// Conversation loop settings
    #[serde(default)]
    pub assistant: AssistantConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Static bearer token callers must present on `/chat`
    #[serde(default = "default_access_token")]
    pub access_token: String,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8000
}
fn default_access_token() -> String {
    "local-demo-token".into()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            access_token: default_access_token(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Sent as `HTTP-Referer` for OpenRouter attribution
    #[serde(default = "default_referer")]
    pub referer: String,

    /// Sent as `X-Title` for OpenRouter attribution
    #[serde(default = "default_title")]
    pub title: String,

    #[serde(default = "default_openrouter_timeout")]
    pub timeout_secs: f64,
}

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_model() -> String {
    "google/gemini-2.0-flash-001".into()
}
fn default_referer() -> String {
    "https://github.com/".into()
}
fn default_title() -> String {
    "hassAI Client".into()
}
fn default_openrouter_timeout() -> f64 {
    60.0
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            referer: default_referer(),
            title: default_title(),
            timeout_secs: default_openrouter_timeout(),
        }
    }
}

impl OpenRouterConfig {
    pub fn timeout(&self) -> Duration {
        timeout_or(self.timeout_secs, default_openrouter_timeout())
    }
}

/// Which MCP transport to speak to the tool service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum McpTransportKind {
    /// Pick from the URL: a path ending in `/sse` means legacy SSE
    #[default]
    Auto,
    Sse,
    StreamableHttp,
}

impl std::str::FromStr for McpTransportKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "sse" => Ok(Self::Sse),
            "streamable_http" | "streamable-http" | "http" => Ok(Self::StreamableHttp),
            other => Err(ConfigError::ValidationError(format!(
                "unknown MCP transport '{other}' (expected auto, sse or streamable_http)"
            ))),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct HomeAssistantConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp_token: Option<String>,

    #[serde(default)]
    pub transport: McpTransportKind,

    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: f64,
}

fn default_tool_timeout() -> f64 {
    30.0
}

impl Default for HomeAssistantConfig {
    fn default() -> Self {
        Self {
            mcp_url: None,
            mcp_token: None,
            transport: McpTransportKind::Auto,
            timeout_secs: default_tool_timeout(),
        }
    }
}

impl HomeAssistantConfig {
    pub fn timeout(&self) -> Duration {
        timeout_or(self.timeout_secs, default_tool_timeout())
    }
}

/// A positive number of seconds that fits in a `Duration`.
fn is_valid_timeout(secs: f64) -> bool {
    secs > 0.0 && Duration::try_from_secs_f64(secs).is_ok()
}

fn timeout_or(secs: f64, fallback: f64) -> Duration {
    let secs = if is_valid_timeout(secs) { secs } else { fallback };
    Duration::from_secs_f64(secs)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    /// Replaces the built-in system directive when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Upper bound on completion rounds in one run
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
}

fn default_max_rounds() -> u32 {
    25
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            system_prompt: None,
            max_rounds: default_max_rounds(),
        }
    }
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
            .field("server", &self.server)
            .field("openrouter", &self.openrouter)
            .field("home_assistant", &self.home_assistant)
            .field("assistant", &self.assistant)
            .finish()
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

impl std::fmt::Debug for OpenRouterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouterConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("referer", &self.referer)
            .field("title", &self.title)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl std::fmt::Debug for HomeAssistantConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HomeAssistantConfig")
            .field("mcp_url", &self.mcp_url)
            .field("mcp_token", &redact(&self.mcp_token))
            .field("transport", &self.transport)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from `$HASSAI_CONFIG` or `~/.hassai/config.toml`.
    ///
    /// A `.env` file in the working directory is read first. Environment
    /// variables then override file values:
    /// - `HASSAI_HOST`, `HASSAI_PORT`, `BACKEND_ACCESS_TOKEN`
    /// - `OPENROUTER_API_KEY`, `OPENROUTER_BASE_URL`, `OPENROUTER_MODEL`,
    ///   `OPENROUTER_REFERER`, `OPENROUTER_TITLE`, `OPENROUTER_TIMEOUT`
    /// - `HOME_ASSISTANT_MCP_URL`, `HOME_ASSISTANT_MCP_TOKEN`,
    ///   `HOME_ASSISTANT_MCP_TRANSPORT`
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded environment from {}", path.display());
        }

        let config_path = std::env::var("HASSAI_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::config_dir().join("config.toml"));
        let mut config = Self::load_from(&config_path)?;

        config.apply_overrides(|key| std::env::var(key).ok())?;
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

    /// Apply overrides from a variable lookup (the process environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(host) = get("HASSAI_HOST") {
            self.server.host = host;
        }
        if let Some(port) = get("HASSAI_PORT") {
            self.server.port = parse_env("HASSAI_PORT", &port)?;
        }
        if let Some(token) = get("BACKEND_ACCESS_TOKEN") {
            self.server.access_token = token;
        }

        if let Some(key) = get("OPENROUTER_API_KEY") {
            self.openrouter.api_key = Some(key);
        }
        if let Some(url) = get("OPENROUTER_BASE_URL") {
            self.openrouter.base_url = url;
        }
        if let Some(model) = get("OPENROUTER_MODEL") {
            self.openrouter.model = model;
        }
        if let Some(referer) = get("OPENROUTER_REFERER") {
            self.openrouter.referer = referer;
        }
        if let Some(title) = get("OPENROUTER_TITLE") {
            self.openrouter.title = title;
        }
        if let Some(timeout) = get("OPENROUTER_TIMEOUT") {
            self.openrouter.timeout_secs = parse_env("OPENROUTER_TIMEOUT", &timeout)?;
        }

        if let Some(url) = get("HOME_ASSISTANT_MCP_URL") {
            self.home_assistant.mcp_url = Some(url);
        }
        if let Some(token) = get("HOME_ASSISTANT_MCP_TOKEN") {
            self.home_assistant.mcp_token = Some(token);
        }
        if let Some(transport) = get("HOME_ASSISTANT_MCP_TRANSPORT") {
            self.home_assistant.transport = transport.parse()?;
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".hassai")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_timeout(self.openrouter.timeout_secs) {
            return Err(ConfigError::ValidationError(
                "openrouter.timeout_secs must be a positive number of seconds".into(),
            ));
        }

        if !is_valid_timeout(self.home_assistant.timeout_secs) {
            return Err(ConfigError::ValidationError(
                "home_assistant.timeout_secs must be a positive number of seconds".into(),
            ));
        }

        if self.assistant.max_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "assistant.max_rounds must be at least 1".into(),
            ));
        }

        if self.server.access_token.is_empty() {
            return Err(ConfigError::ValidationError(
                "server.access_token must not be empty".into(),
            ));
        }

        Ok(())
    }

    /// Check that every secret needed to serve a conversation is present.
    pub fn ensure_complete(&self) -> Result<(), ConfigError> {
        let mut missing = Vec::new();
        if self.openrouter.api_key.is_none() {
            missing.push("OPENROUTER_API_KEY");
        }
        if self.home_assistant.mcp_url.is_none() {
            missing.push("HOME_ASSISTANT_MCP_URL");
        }
        if self.home_assistant.mcp_token.is_none() {
            missing.push("HOME_ASSISTANT_MCP_TOKEN");
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::MissingSettings(missing.join(", ")))
        }
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| {
        ConfigError::ValidationError(format!("environment variable {key} has invalid value '{value}'"))
    })
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
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

    #[error("Missing required settings: {0}")]
    MissingSettings(String),
}
