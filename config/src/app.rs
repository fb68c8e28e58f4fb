use std::env;
use std::fs;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

use quire_types::{ApiKey, Provider};

pub const DEFAULT_BIND: &str = "127.0.0.1:4317";

#[derive(Debug, Default, Deserialize)]
pub struct QuireConfig {
    pub app: Option<AppSection>,
    pub server: Option<ServerSection>,
    pub api_keys: Option<ApiKeys>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AppSection {
    /// Model id used when a request does not name one.
    pub model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ServerSection {
    pub bind: Option<String>,
}

#[derive(Default, Deserialize)]
pub struct ApiKeys {
    pub anthropic: Option<String>,
    pub openai: Option<String>,
    pub google: Option<String>,
}

// Manual Debug impl to prevent leaking API keys in logs.
impl std::fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn mask(opt: Option<&String>) -> &'static str {
            if opt.is_some() { "[REDACTED]" } else { "None" }
        }
        f.debug_struct("ApiKeys")
            .field("anthropic", &mask(self.anthropic.as_ref()))
            .field("openai", &mask(self.openai.as_ref()))
            .field("google", &mask(self.google.as_ref()))
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl QuireConfig {
    /// Load `config.toml`; a missing file is not an error.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        let Some(path) = Self::path() else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).map_err(|source| {
            tracing::warn!("Failed to read config at {:?}: {}", path, source);
            ConfigError::Read {
                path: path.clone(),
                source,
            }
        })?;
        Self::parse(&content).map(Some).map_err(|source| {
            tracing::warn!("Failed to parse config at {:?}: {}", path, source);
            ConfigError::Parse { path, source }
        })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        crate::quire_home().map(|home| home.join("config.toml"))
    }

    #[must_use]
    pub fn bind_address(&self) -> String {
        self.server
            .as_ref()
            .and_then(|server| server.bind.clone())
            .unwrap_or_else(|| DEFAULT_BIND.to_string())
    }

    #[must_use]
    pub fn default_model(&self) -> Option<&str> {
        self.app.as_ref().and_then(|app| app.model.as_deref())
    }

    /// Key from the config file (with `${VAR}` expansion), else the provider's env var.
    #[must_use]
    pub fn api_key(&self, provider: Provider) -> Option<ApiKey> {
        let configured = self.api_keys.as_ref().and_then(|keys| match provider {
            Provider::Claude => keys.anthropic.as_deref(),
            Provider::OpenAI => keys.openai.as_deref(),
            Provider::Gemini => keys.google.as_deref(),
        });
        configured
            .map(expand_env_vars)
            .filter(|key| !key.trim().is_empty())
            .or_else(|| {
                env::var(provider.env_var())
                    .ok()
                    .filter(|key| !key.trim().is_empty())
            })
            .map(|key| ApiKey::new(provider, key))
    }
}

pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let var = &after[..end];
                if !var.is_empty() {
                    out.push_str(&env::var(var).unwrap_or_default());
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
