//! Configuration loading and validation.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

/// Top-level makereal configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub models: Option<ModelsConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<GatewayConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub handshake: Option<HandshakeConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub make_real: Option<MakeRealConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

// --- Typed provider config ---

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub providers: Option<Vec<ProviderConfig>>,
}

/// Configuration for a single model provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl ProviderConfig {
    /// Resolve the API key: check `api_key` field first, then `api_key_env` environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret_field(&self.api_key, &self.api_key_env)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,

    /// Allow cross-origin requests from any origin (default: true).
    #[serde(default = "default_true")]
    pub permissive_cors: bool,

    /// Public base URL used when building surface document links.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
}

fn default_port() -> u16 {
    3210
}

fn default_true() -> bool {
    true
}

/// Screenshot handshake tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeConfig {
    /// How long to wait for a surface to answer a capture request (default: 2000).
    #[serde(default = "default_handshake_timeout")]
    pub timeout_ms: u64,
}

fn default_handshake_timeout() -> u64 {
    2000
}

/// Settings for the make-real pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MakeRealConfig {
    /// Provider id from `models.providers` (default: first configured, else "openai").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    /// Replaces the built-in system prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "plain" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log level override (trace/debug/info/warn/error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Per-crate log level overrides (e.g. "makereal_canvas=debug").
    #[serde(default)]
    pub filters: Vec<String>,

    /// Output target: "stderr" (default) or "stdout".
    #[serde(default = "default_log_output")]
    pub output: String,
}

fn default_log_format() -> String {
    "plain".into()
}

fn default_log_output() -> String {
    "stderr".into()
}

/// Resolve a secret: check the direct value first, then the env-var reference.
pub fn resolve_secret_field(direct: &Option<String>, env_var: &Option<String>) -> Option<String> {
    if let Some(val) = direct {
        if !val.is_empty() {
            return Some(val.clone());
        }
    }
    if let Some(env) = env_var {
        if let Ok(val) = std::env::var(env) {
            if !val.is_empty() {
                return Some(val);
            }
        }
    }
    None
}

static ENV_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("static env var pattern"));

/// Substitute `${ENV_VAR}` patterns in a string with their environment variable values.
fn substitute_env_vars(input: &str) -> String {
    ENV_VAR.replace_all(input, |caps: &Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_default()
    })
    .into_owned()
}

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;

        // Substitute ${ENV_VAR} references before parsing
        let substituted = substitute_env_vars(&raw);

        let config: Config = json5::from_str(&substituted)
            .map_err(|e| crate::error::MakeRealError::Config(e.to_string()))?;

        Ok(config)
    }

    /// Default config file path.
    pub fn config_dir() -> PathBuf {
        data_dir().join("config.json")
    }

    /// Gateway port.
    pub fn gateway_port(&self) -> u16 {
        self.gateway.as_ref().map(|g| g.port).unwrap_or_else(default_port)
    }

    /// Gateway bind address.
    pub fn gateway_bind(&self) -> String {
        self.gateway
            .as_ref()
            .and_then(|g| g.bind.clone())
            .unwrap_or_else(|| "127.0.0.1".to_string())
    }

    /// How long a screenshot handshake waits before giving up.
    pub fn handshake_timeout(&self) -> Duration {
        let ms = self
            .handshake
            .as_ref()
            .map(|h| h.timeout_ms)
            .unwrap_or_else(default_handshake_timeout);
        Duration::from_millis(ms)
    }

    /// Provider used by the make-real pipeline.
    pub fn make_real_provider(&self) -> Option<&ProviderConfig> {
        match self.make_real.as_ref().and_then(|m| m.provider.as_deref()) {
            Some(id) => self.provider(id),
            None => self.first_provider(),
        }
    }

    /// Model used by the make-real pipeline.
    pub fn make_real_model(&self) -> String {
        self.make_real
            .as_ref()
            .and_then(|m| m.model.clone())
            .or_else(|| self.make_real_provider().and_then(|p| p.default_model.clone()))
            .unwrap_or_else(|| "gpt-4o".to_string())
    }

    /// Completion token budget for the make-real pipeline.
    pub fn max_tokens(&self) -> u32 {
        self.make_real
            .as_ref()
            .and_then(|m| m.max_tokens)
            .unwrap_or(4096)
    }

    pub fn temperature(&self) -> Option<f64> {
        self.make_real.as_ref().and_then(|m| m.temperature)
    }

    /// System prompt override for the make-real pipeline.
    pub fn system_prompt(&self) -> Option<&str> {
        self.make_real.as_ref().and_then(|m| m.system_prompt.as_deref())
    }

    /// Find a provider config by id.
    pub fn provider(&self, id: &str) -> Option<&ProviderConfig> {
        self.models
            .as_ref()
            .and_then(|m| m.providers.as_ref())
            .and_then(|p| p.iter().find(|pc| pc.id == id))
    }

    /// Get the first provider config.
    pub fn first_provider(&self) -> Option<&ProviderConfig> {
        self.models
            .as_ref()
            .and_then(|m| m.providers.as_ref())
            .and_then(|p| p.first())
    }

    /// Get a config value by dotted path (e.g. "gateway.port", "handshake.timeout_ms").
    pub fn get_path(&self, path: &str) -> Option<serde_json::Value> {
        let json = serde_json::to_value(self).ok()?;
        let mut current = &json;
        for segment in path.split('.') {
            current = current.get(segment)?;
        }
        Some(current.clone())
    }

    /// Validate config, returning (warnings, errors).
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        if let Some(providers) = self.models.as_ref().and_then(|m| m.providers.as_ref()) {
            for p in providers {
                if p.resolve_api_key().is_none() {
                    warnings.push(format!(
                        "Provider '{}' has no API key configured; one must be supplied per session",
                        p.id
                    ));
                }
            }
        }

        if let Some(wanted) = self.make_real.as_ref().and_then(|m| m.provider.as_deref()) {
            if self.provider(wanted).is_none() {
                errors.push(format!("make_real.provider '{wanted}' is not configured"));
            }
        }

        if let Some(gw) = &self.gateway {
            if gw.port == 0 {
                errors.push("Gateway port cannot be 0".to_string());
            }
        }

        if let Some(hs) = &self.handshake {
            if hs.timeout_ms == 0 {
                errors.push("handshake.timeout_ms must be greater than 0".to_string());
            }
        }

        (warnings, errors)
    }

    /// Save config to a file.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Base directory for makereal data: `~/.makereal/`
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".makereal")
}
