//! Configuration for agentline.
//!
//! Values resolve with priority: env var > TOML config file > default.
//! The TOML file lives at `~/.agentline/config.toml` (overridable with
//! `--config`); env files load via [`crate::bootstrap::load_agentline_env`].

use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

/// Chain id used when no wallet connection supplies one (Base mainnet).
pub const DEFAULT_CHAIN_ID: u64 = 8453;

const DEFAULT_POLL_INTERVAL_MS: u64 = 3_000;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Main configuration for the client.
#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub chat: ChatConfig,
    pub rpc: RpcConfig,
}

/// Backend REST API endpoint config.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL of the agent backend, e.g. `https://api.example.xyz`.
    pub base_url: String,
    pub timeout_ms: u64,
}

/// Chat loop config.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Transcript poll cadence.
    pub poll_interval_ms: u64,
    /// Chain id sent with messages when no override is given.
    pub default_chain_id: u64,
}

/// JSON-RPC endpoint config for balance queries.
#[derive(Debug, Clone)]
pub struct RpcConfig {
    pub url: Option<String>,
}

/// On-disk settings shape (`~/.agentline/config.toml`). All fields optional;
/// resolution fills in defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileSettings {
    #[serde(default)]
    api: FileApiSettings,
    #[serde(default)]
    chat: FileChatSettings,
    #[serde(default)]
    rpc: FileRpcSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileApiSettings {
    base_url: Option<String>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileChatSettings {
    poll_interval_ms: Option<u64>,
    default_chain_id: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileRpcSettings {
    url: Option<String>,
}

impl FileSettings {
    /// Load the TOML settings file. `Ok(None)` when the file doesn't exist.
    pub fn load(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(path)?;
        let settings = toml::from_str(&raw).map_err(|e| {
            ConfigError::ParseError(format!("{}: {}", path.display(), e))
        })?;
        Ok(Some(settings))
    }

    /// Default settings file path: `~/.agentline/config.toml`.
    pub fn default_path() -> std::path::PathBuf {
        crate::bootstrap::agentline_dir().join("config.toml")
    }
}

/// Read an env var, treating unset and blank as absent.
fn optional_env(key: &str) -> Option<String> {
    match std::env::var(key) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Err(_) => None,
    }
}

fn parse_positive_ms(raw: Option<String>, key: &str, fallback: u64) -> Result<u64, ConfigError> {
    let value = raw
        .map(|s| s.parse())
        .transpose()
        .map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("must be a positive integer: {e}"),
        })?
        .unwrap_or(fallback);
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be > 0".to_string(),
        });
    }
    Ok(value)
}

fn validate_base_url(raw: &str, key: &str) -> Result<String, ConfigError> {
    let parsed = url::Url::parse(raw).map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("not a valid URL: {e}"),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("scheme '{}' is not http(s)", parsed.scheme()),
        });
    }
    Ok(raw.trim_end_matches('/').to_string())
}

impl ApiConfig {
    fn resolve(settings: &FileSettings) -> Result<Self, ConfigError> {
        let base_url = optional_env("AGENTLINE_API_BASE_URL")
            .or_else(|| settings.api.base_url.clone())
            .ok_or_else(|| ConfigError::MissingRequired {
                key: "AGENTLINE_API_BASE_URL".to_string(),
                hint: "Set it in the environment or under [api].base_url in \
                       ~/.agentline/config.toml"
                    .to_string(),
            })?;
        let base_url = validate_base_url(&base_url, "AGENTLINE_API_BASE_URL")?;

        let timeout_ms = parse_positive_ms(
            optional_env("AGENTLINE_API_TIMEOUT_MS"),
            "AGENTLINE_API_TIMEOUT_MS",
            settings.api.timeout_ms.unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
        )?;

        Ok(Self {
            base_url,
            timeout_ms,
        })
    }
}

impl ChatConfig {
    fn resolve(settings: &FileSettings) -> Result<Self, ConfigError> {
        let poll_interval_ms = parse_positive_ms(
            optional_env("AGENTLINE_POLL_INTERVAL_MS"),
            "AGENTLINE_POLL_INTERVAL_MS",
            settings
                .chat
                .poll_interval_ms
                .unwrap_or(DEFAULT_POLL_INTERVAL_MS),
        )?;

        let default_chain_id = optional_env("AGENTLINE_CHAIN_ID")
            .map(|s| s.parse())
            .transpose()
            .map_err(|e| ConfigError::InvalidValue {
                key: "AGENTLINE_CHAIN_ID".to_string(),
                message: format!("must be a positive integer: {e}"),
            })?
            .or(settings.chat.default_chain_id)
            .unwrap_or(DEFAULT_CHAIN_ID);
        if default_chain_id == 0 {
            return Err(ConfigError::InvalidValue {
                key: "AGENTLINE_CHAIN_ID".to_string(),
                message: "must be > 0".to_string(),
            });
        }

        Ok(Self {
            poll_interval_ms,
            default_chain_id,
        })
    }
}

impl RpcConfig {
    fn resolve(settings: &FileSettings) -> Result<Self, ConfigError> {
        let url = match optional_env("AGENTLINE_RPC_URL").or_else(|| settings.rpc.url.clone()) {
            Some(raw) => Some(validate_base_url(&raw, "AGENTLINE_RPC_URL")?),
            None => None,
        };
        Ok(Self { url })
    }
}

impl Config {
    /// Load configuration from env vars and the TOML settings file.
    ///
    /// With an explicit path, a missing or malformed file is fatal; the
    /// default path is silently skipped when absent.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
        crate::bootstrap::load_agentline_env();

        let path = explicit_path
            .map(std::path::PathBuf::from)
            .unwrap_or_else(FileSettings::default_path);

        let settings = match FileSettings::load(&path) {
            Ok(Some(settings)) => {
                tracing::debug!("Loaded settings from {}", path.display());
                settings
            }
            Ok(None) => {
                if explicit_path.is_some() {
                    return Err(ConfigError::ParseError(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
                FileSettings::default()
            }
            Err(e) => {
                if explicit_path.is_some() {
                    return Err(e);
                }
                tracing::warn!("Failed to load default config file: {}", e);
                FileSettings::default()
            }
        };

        Self::build(&settings)
    }

    fn build(settings: &FileSettings) -> Result<Self, ConfigError> {
        Ok(Self {
            api: ApiConfig::resolve(settings)?,
            chat: ChatConfig::resolve(settings)?,
            rpc: RpcConfig::resolve(settings)?,
        })
    }
}
