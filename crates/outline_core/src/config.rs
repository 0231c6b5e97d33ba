//! Engine tuning knobs.
//!
//! # Responsibility
//! - Hold history, coalescing, persistence batching and focus policies.
//! - Load from JSON with per-field defaults.
//!
//! # Invariants
//! - `history_limit` and `persist_max_attempts` are positive after
//!   `validate()`.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Where focus lands after the focused node is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteFocusPolicy {
    /// Next visible node at its start, else previous at its end.
    #[default]
    NextThenPrevious,
    /// Previous visible node at its end, else next at its start.
    PreviousThenNext,
}

/// Errors from config loading.
#[derive(Debug)]
pub enum ConfigError {
    Parse(serde_json::Error),
    Invalid(&'static str),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "invalid engine config: {err}"),
            Self::Invalid(message) => write!(f, "invalid engine config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of undo entries kept.
    pub history_limit: usize,
    /// Window in which content edits on one node share an undo entry.
    pub text_coalesce_ms: u64,
    /// Quiet period before a content update is sent to persistence.
    pub persist_debounce_ms: u64,
    /// Attempts before a failing persistence op is dropped.
    pub persist_max_attempts: u32,
    pub delete_focus: DeleteFocusPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_limit: 200,
            text_coalesce_ms: 1_000,
            persist_debounce_ms: 750,
            persist_max_attempts: 5,
            delete_focus: DeleteFocusPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Parses JSON; missing fields keep their defaults.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history_limit == 0 {
            return Err(ConfigError::Invalid("history_limit must be positive"));
        }
        if self.persist_max_attempts == 0 {
            return Err(ConfigError::Invalid("persist_max_attempts must be positive"));
        }
        Ok(())
    }

    pub fn text_coalesce_window(&self) -> Duration {
        Duration::from_millis(self.text_coalesce_ms)
    }

    pub fn persist_debounce(&self) -> Duration {
        Duration::from_millis(self.persist_debounce_ms)
    }
}
