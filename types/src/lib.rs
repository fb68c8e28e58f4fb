//! Core domain types for Quire.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the application: the tool layer,
//! the provider clients, the engine state container and the HTTP surface.

#![allow(clippy::missing_errors_doc)]

mod fs;
mod message;
mod model;
mod review;
mod tool;

pub use fs::{FileNode, NodeKind};
pub use message::{ChatMessage, MessagePart, Role};
pub use model::{ApiKey, EnumParseError, PredefinedModel, Provider};
pub use review::{PendingChange, PermissionRequest, PermissionStatus};
pub use tool::{StreamEvent, ToolCall, ToolChoice, ToolDefinition};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A string guaranteed to be non-empty (after trimming).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NonEmptyString(String);

#[derive(Debug, Error)]
#[error("value must not be empty")]
pub struct EmptyStringError;

impl NonEmptyString {
    pub fn new(value: impl Into<String>) -> Result<Self, EmptyStringError> {
        let value = value.into();
        if value.trim().is_empty() {
            Err(EmptyStringError)
        } else {
            Ok(Self(value))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl TryFrom<String> for NonEmptyString {
    type Error = EmptyStringError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for NonEmptyString {
    type Error = EmptyStringError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NonEmptyString> for String {
    fn from(value: NonEmptyString) -> Self {
        value.0
    }
}

impl std::ops::Deref for NonEmptyString {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

impl AsRef<str> for NonEmptyString {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::NonEmptyString;

    #[test]
    fn non_empty_string_rejects_blank() {
        assert!(NonEmptyString::new("").is_err());
        assert!(NonEmptyString::new("  \n").is_err());
        assert_eq!(NonEmptyString::new("a.md").unwrap().as_str(), "a.md");
    }

    #[test]
    fn non_empty_string_deserialize_validates() {
        let ok: Result<NonEmptyString, _> = serde_json::from_str("\"hello\"");
        assert!(ok.is_ok());
        let bad: Result<NonEmptyString, _> = serde_json::from_str("\"   \"");
        assert!(bad.is_err());
    }
}
