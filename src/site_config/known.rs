//! Keys the client understands, with typed values and built-in defaults.
//!
//! Unknown keys pass through as raw JSON. Known keys are validated; a
//! malformed value is logged and treated as absent so the default applies.

use serde_json::Value;
use tracing::warn;

use crate::net::types::SiteConfig;

pub const EXAM_CATEGORIES_KEY: &str = "examCategories";

/// Shown until an admin configures `examCategories`.
pub const DEFAULT_EXAM_CATEGORIES: [&str; 6] = ["All Exams", "JEE Main/Advanced", "NEET", "Banking", "SSC", "GATE"];

#[must_use]
pub fn default_exam_categories() -> Vec<String> {
    DEFAULT_EXAM_CATEGORIES.iter().map(|&c| c.to_owned()).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownKey {
    ExamCategories,
}

impl KnownKey {
    pub const ALL: [KnownKey; 1] = [KnownKey::ExamCategories];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ExamCategories => EXAM_CATEGORIES_KEY,
        }
    }

    #[must_use]
    pub fn parse(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigValueError {
    #[error("config key {key} must be {expected}")]
    Malformed { key: &'static str, expected: &'static str },
}

/// A config value interpreted according to its key.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    ExamCategories(Vec<String>),
    Unknown(Value),
}

impl ConfigValue {
    /// Interpret `value` as stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigValueError::Malformed`] when a known key holds a value
    /// of the wrong shape.
    pub fn parse(key: &str, value: &Value) -> Result<Self, ConfigValueError> {
        match KnownKey::parse(key) {
            Some(KnownKey::ExamCategories) => parse_string_list(value)
                .map(Self::ExamCategories)
                .ok_or(ConfigValueError::Malformed { key: EXAM_CATEGORIES_KEY, expected: "an array of strings" }),
            None => Ok(Self::Unknown(value.clone())),
        }
    }
}

fn parse_string_list(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|item| item.as_str().map(str::to_owned))
        .collect()
}

impl SiteConfig {
    /// Typed value under `key`, `None` when the key is absent.
    #[must_use]
    pub fn typed(&self, key: &str) -> Option<Result<ConfigValue, ConfigValueError>> {
        self.get(key).map(|value| ConfigValue::parse(key, value))
    }

    /// Configured exam categories, if present, well-formed and non-empty.
    #[must_use]
    pub fn exam_categories(&self) -> Option<Vec<String>> {
        match self.typed(EXAM_CATEGORIES_KEY)? {
            Ok(ConfigValue::ExamCategories(categories)) if !categories.is_empty() => Some(categories),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "ignoring malformed config value");
                None
            }
        }
    }

    /// Configured exam categories, or the built-in list.
    #[must_use]
    pub fn exam_categories_or_default(&self) -> Vec<String> {
        self.exam_categories().unwrap_or_else(default_exam_categories)
    }
}

#[cfg(test)]
#[path = "known_test.rs"]
mod tests;
