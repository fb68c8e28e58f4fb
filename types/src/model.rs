//! Provider enumeration and the model allow-list.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Claude,
    OpenAI,
    Gemini,
}

const PROVIDER_PARSE_VALUES: &[&str] = &[
    "claude",
    "anthropic",
    "openai",
    "gpt",
    "gemini",
    "google",
];

const ALL_MODEL_IDS: &[&str] = &[
    "claude-sonnet-4-6",
    "claude-haiku-4-5-20251001",
    "claude-opus-4-6",
    "gpt-5.2",
    "gpt-5.2-mini",
    "gemini-3.1-pro-preview",
    "gemini-3-flash-preview",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind} value '{raw}'; expected one of: {expected:?}")]
pub struct EnumParseError {
    kind: &'static str,
    raw: String,
    expected: &'static [&'static str],
}

impl EnumParseError {
    #[must_use]
    pub fn new(kind: &'static str, raw: impl Into<String>, expected: &'static [&'static str]) -> Self {
        Self {
            kind,
            raw: raw.into(),
            expected,
        }
    }

    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    #[must_use]
    pub const fn expected(&self) -> &'static [&'static str] {
        self.expected
    }
}

impl Provider {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Claude => "claude",
            Provider::OpenAI => "openai",
            Provider::Gemini => "gemini",
        }
    }

    #[must_use]
    pub fn env_var(&self) -> &'static str {
        match self {
            Provider::Claude => "ANTHROPIC_API_KEY",
            Provider::OpenAI => "OPENAI_API_KEY",
            Provider::Gemini => "GEMINI_API_KEY",
        }
    }

    pub fn parse(s: &str) -> Result<Self, EnumParseError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "claude" | "anthropic" => Ok(Provider::Claude),
            "openai" | "gpt" => Ok(Provider::OpenAI),
            "gemini" | "google" => Ok(Provider::Gemini),
            _ => Err(EnumParseError::new(
                "provider",
                s.trim(),
                PROVIDER_PARSE_VALUES,
            )),
        }
    }

    #[must_use]
    pub fn all() -> &'static [Provider] {
        &[Provider::Claude, Provider::OpenAI, Provider::Gemini]
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The closed set of models a conversation may be routed to.
///
/// Lookup is exact (case-insensitive, trimmed); anything else is rejected so a
/// conversation is never sent to a provider the user did not pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PredefinedModel {
    ClaudeSonnet,
    ClaudeHaiku,
    ClaudeOpus,
    Gpt52,
    Gpt52Mini,
    GeminiPro,
    GeminiFlash,
}

impl PredefinedModel {
    #[must_use]
    pub const fn all() -> &'static [PredefinedModel] {
        &[
            PredefinedModel::ClaudeSonnet,
            PredefinedModel::ClaudeHaiku,
            PredefinedModel::ClaudeOpus,
            PredefinedModel::Gpt52,
            PredefinedModel::Gpt52Mini,
            PredefinedModel::GeminiPro,
            PredefinedModel::GeminiFlash,
        ]
    }

    #[must_use]
    pub const fn model_id(self) -> &'static str {
        match self {
            PredefinedModel::ClaudeSonnet => "claude-sonnet-4-6",
            PredefinedModel::ClaudeHaiku => "claude-haiku-4-5-20251001",
            PredefinedModel::ClaudeOpus => "claude-opus-4-6",
            PredefinedModel::Gpt52 => "gpt-5.2",
            PredefinedModel::Gpt52Mini => "gpt-5.2-mini",
            PredefinedModel::GeminiPro => "gemini-3.1-pro-preview",
            PredefinedModel::GeminiFlash => "gemini-3-flash-preview",
        }
    }

    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            PredefinedModel::ClaudeSonnet => "Claude Sonnet 4.6",
            PredefinedModel::ClaudeHaiku => "Claude Haiku 4.5",
            PredefinedModel::ClaudeOpus => "Claude Opus 4.6",
            PredefinedModel::Gpt52 => "GPT 5.2",
            PredefinedModel::Gpt52Mini => "GPT 5.2 Mini",
            PredefinedModel::GeminiPro => "Gemini 3.1 Pro",
            PredefinedModel::GeminiFlash => "Gemini 3 Flash",
        }
    }

    #[must_use]
    pub const fn provider(self) -> Provider {
        match self {
            PredefinedModel::ClaudeSonnet
            | PredefinedModel::ClaudeHaiku
            | PredefinedModel::ClaudeOpus => Provider::Claude,
            PredefinedModel::Gpt52 | PredefinedModel::Gpt52Mini => Provider::OpenAI,
            PredefinedModel::GeminiPro | PredefinedModel::GeminiFlash => Provider::Gemini,
        }
    }

    pub fn from_model_id(raw: &str) -> Result<Self, EnumParseError> {
        let trimmed = raw.trim();
        Self::all()
            .iter()
            .copied()
            .find(|model| !trimmed.is_empty() && model.model_id().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| EnumParseError::new("model", trimmed, ALL_MODEL_IDS))
    }
}

impl fmt::Display for PredefinedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.model_id())
    }
}

/// API key tagged with the provider it belongs to.
///
/// `Debug` is implemented by hand so the secret never reaches a log line.
#[derive(Clone, PartialEq, Eq)]
pub enum ApiKey {
    Claude(String),
    OpenAI(String),
    Gemini(String),
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiKey::{:?}([REDACTED])", self.provider())
    }
}

impl ApiKey {
    #[must_use]
    pub fn new(provider: Provider, key: impl Into<String>) -> Self {
        match provider {
            Provider::Claude => ApiKey::Claude(key.into()),
            Provider::OpenAI => ApiKey::OpenAI(key.into()),
            Provider::Gemini => ApiKey::Gemini(key.into()),
        }
    }

    #[must_use]
    pub fn provider(&self) -> Provider {
        match self {
            ApiKey::Claude(_) => Provider::Claude,
            ApiKey::OpenAI(_) => Provider::OpenAI,
            ApiKey::Gemini(_) => Provider::Gemini,
        }
    }

    #[must_use]
    pub fn expose_secret(&self) -> &str {
        match self {
            ApiKey::Claude(key) | ApiKey::OpenAI(key) | ApiKey::Gemini(key) => key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ApiKey, PredefinedModel, Provider};

    #[test]
    fn model_lookup_is_exact_and_case_insensitive() {
        assert_eq!(
            PredefinedModel::from_model_id(" Claude-Sonnet-4-6 ").unwrap(),
            PredefinedModel::ClaudeSonnet
        );
        assert_eq!(
            PredefinedModel::from_model_id("gpt-5.2").unwrap().provider(),
            Provider::OpenAI
        );
    }

    #[test]
    fn unknown_model_fails_closed() {
        assert!(PredefinedModel::from_model_id("gpt-4o").is_err());
        assert!(PredefinedModel::from_model_id("claude").is_err());
        assert!(PredefinedModel::from_model_id("").is_err());
    }

    #[test]
    fn every_model_id_round_trips() {
        for model in PredefinedModel::all() {
            assert_eq!(
                PredefinedModel::from_model_id(model.model_id()).unwrap(),
                *model
            );
        }
    }

    #[test]
    fn provider_parse_accepts_aliases() {
        assert_eq!(Provider::parse("Anthropic").unwrap(), Provider::Claude);
        assert_eq!(Provider::parse("google").unwrap(), Provider::Gemini);
        assert!(Provider::parse("mistral").is_err());
    }

    #[test]
    fn api_key_debug_is_redacted() {
        let key = ApiKey::new(Provider::OpenAI, "sk-secret");
        let debug = format!("{key:?}");
        assert!(!debug.contains("sk-secret"));
        assert_eq!(key.expose_secret(), "sk-secret");
    }
}
