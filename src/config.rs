use crate::auth::{RegisterPolicy, DEFAULT_NOTICE_TTL_MS};
use crate::http::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT_MS};
use crate::session::DEFAULT_TOKEN_KEY;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A validation error in the configuration
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]: {}", self.field, self.message)
    }
}

/// Remote API endpoint
#[derive(Debug, Clone, Serialize)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_ms: u64,
}

/// Where the session token is kept
#[derive(Debug, Clone, Serialize)]
pub struct SessionConfig {
    pub storage_path: PathBuf,
    pub token_key: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthConfig {
    pub register_policy: RegisterPolicy,
    pub notice_ttl_ms: u64,
}

/// Activity log settings
#[derive(Debug, Clone, Serialize)]
pub struct LogConfig {
    pub enabled: bool,
    pub dir: PathBuf,
}

/// Fully resolved configuration
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub api: ApiConfig,
    pub session: SessionConfig,
    pub auth: AuthConfig,
    pub log: LogConfig,
}

/// One config file. Unset keys leave the lower layer's value alone.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigLayer {
    #[serde(default)]
    pub api: ApiLayer,
    #[serde(default)]
    pub session: SessionLayer,
    #[serde(default)]
    pub auth: AuthLayer,
    #[serde(default)]
    pub log: LogLayer,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiLayer {
    pub base_url: Option<String>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionLayer {
    pub storage_path: Option<PathBuf>,
    pub token_key: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthLayer {
    pub register_policy: Option<RegisterPolicy>,
    pub notice_ttl_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogLayer {
    pub enabled: Option<bool>,
    pub dir: Option<PathBuf>,
}

impl ConfigLayer {
    /// Load a single config file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let layer: ConfigLayer = toml::from_str(&content)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        Ok(layer)
    }
}

/// `~/.mess`, or `.mess` in the working directory when there is no home.
pub fn state_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".mess"))
        .unwrap_or_else(|| PathBuf::from(".mess"))
}

impl Default for Config {
    fn default() -> Self {
        let state = state_dir();
        Self {
            api: ApiConfig {
                base_url: DEFAULT_BASE_URL.to_string(),
                timeout_ms: DEFAULT_TIMEOUT_MS,
            },
            session: SessionConfig {
                storage_path: state.join("storage.json"),
                token_key: DEFAULT_TOKEN_KEY.to_string(),
            },
            auth: AuthConfig {
                register_policy: RegisterPolicy::default(),
                notice_ttl_ms: DEFAULT_NOTICE_TTL_MS,
            },
            log: LogConfig {
                enabled: true,
                dir: state.join("logs"),
            },
        }
    }
}

impl Config {
    /// Load configuration from default paths
    /// Priority: local (.mess/config.local.toml) > project (.mess/config.toml) > user (~/.mess/config.toml)
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".mess").join("config.toml");
            if user_config.exists() {
                config.merge(ConfigLayer::load_from(&user_config)?);
            }
        }

        let project_config = Path::new(".mess").join("config.toml");
        if project_config.exists() {
            config.merge(ConfigLayer::load_from(&project_config)?);
        }

        // Should be gitignored
        let local_config = Path::new(".mess").join("config.local.toml");
        if local_config.exists() {
            config.merge(ConfigLayer::load_from(&local_config)?);
        }

        Ok(config)
    }

    /// Defaults plus exactly one file
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::default();
        config.merge(ConfigLayer::load_from(path)?);
        Ok(config)
    }

    /// Merge a layer into this config (the layer takes priority where set)
    pub fn merge(&mut self, layer: ConfigLayer) {
        if let Some(base_url) = layer.api.base_url {
            self.api.base_url = base_url;
        }
        if let Some(timeout_ms) = layer.api.timeout_ms {
            self.api.timeout_ms = timeout_ms;
        }

        if let Some(path) = layer.session.storage_path {
            self.session.storage_path = path;
        }
        if let Some(key) = layer.session.token_key {
            self.session.token_key = key;
        }

        if let Some(policy) = layer.auth.register_policy {
            self.auth.register_policy = policy;
        }
        if let Some(ttl) = layer.auth.notice_ttl_ms {
            self.auth.notice_ttl_ms = ttl;
        }

        if let Some(enabled) = layer.log.enabled {
            self.log.enabled = enabled;
        }
        if let Some(dir) = layer.log.dir {
            self.log.dir = dir;
        }
    }

    /// Validate configuration and return any errors found
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        let url = self.api.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            errors.push(ValidationError {
                field: "api.base_url".to_string(),
                message: format!("Expected an http:// or https:// URL, got '{}'", url),
            });
        }

        if self.api.timeout_ms == 0 {
            errors.push(ValidationError {
                field: "api.timeout_ms".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if self.session.token_key.trim().is_empty() {
            errors.push(ValidationError {
                field: "session.token_key".to_string(),
                message: "Must not be empty".to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Effective configuration as TOML, for `--show-config`
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
