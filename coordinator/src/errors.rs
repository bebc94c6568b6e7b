//! Error types for the retirement coordinator
//!
//! `ProviderError` covers every collaborator failure (compute API, queue, trigger store).
//! `CoordinatorError` is what a stage invocation can fail with; everything else a stage
//! encounters is logged and absorbed.

use std::fmt;
use thiserror::Error;

/// The power operation a dry-run or real call was made for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PowerAction {
    Stop,
    Start,
}

impl fmt::Display for PowerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerAction::Stop => write!(f, "stop"),
            PowerAction::Start => write!(f, "start"),
        }
    }
}

/// Failures reported by an external collaborator
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The request never produced a usable response
    #[error("request to {endpoint} failed: {reason}")]
    Transport { endpoint: String, reason: String },

    /// The provider answered with an error code
    #[error("{operation} rejected by provider ({code}): {message}")]
    Api {
        operation: String,
        code: String,
        message: String,
    },

    /// The instance is unknown to the provider
    #[error("instance {instance_id} not found")]
    InstanceNotFound { instance_id: String },

    /// A dry-run reported that the real call would not be permitted
    #[error("dry-run {action} denied for {instance_id}: {reason}")]
    DryRunDenied {
        action: PowerAction,
        instance_id: String,
        reason: String,
    },

    /// Queue or trigger persistence failed
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for ProviderError {
    fn from(err: sqlx::Error) -> Self {
        ProviderError::Storage(err.to_string())
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Transport {
            endpoint: err
                .url()
                .map(|u| u.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            reason: err.to_string(),
        }
    }
}

/// Configuration error variants
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file
    #[error("failed to load config from '{path}': {reason}")]
    LoadFailed { path: String, reason: String },

    /// Configuration parsing error
    #[error("failed to parse config: {reason}")]
    ParseError { reason: String },

    /// Invalid configuration value
    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Errors that abort a stage invocation
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// The dry-run check failed for something other than the dry-run confirmation
    #[error("not authorized to {action} instance {instance_id}: {source}")]
    Authorization {
        action: PowerAction,
        instance_id: String,
        #[source]
        source: ProviderError,
    },
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;
