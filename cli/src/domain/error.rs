//! Typed domain error enums.
//!
//! `ReconcileError` is the fatal-error taxonomy of a run. Every variant
//! names the action that failed; none of them is recovered from inside the
//! run.

use converge_common::{FailureKind, RunFailure};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReconcileError {
    /// The state store or the installer could not be queried, so skip vs.
    /// apply cannot be decided.
    #[error("precondition check for '{action}' failed: {message}")]
    PreconditionCheckFailed { action: String, message: String },

    /// A collaborator call (install, render, script, filesystem) failed.
    #[error("'{action}' failed: {message}")]
    EffectFailed { action: String, message: String },

    /// The effect succeeded but its marker was not written; a re-run may
    /// apply the effect again.
    #[error("'{action}' was applied but its marker could not be recorded: {message}")]
    PostconditionWriteFailed { action: String, message: String },

    #[error("secret for '{action}' could not be resolved: {message}")]
    SecretResolutionFailed { action: String, message: String },
}

impl ReconcileError {
    pub fn precondition(action: &str, err: &anyhow::Error) -> Self {
        Self::PreconditionCheckFailed {
            action: action.to_string(),
            message: format!("{err:#}"),
        }
    }

    pub fn effect(action: &str, err: &anyhow::Error) -> Self {
        Self::EffectFailed {
            action: action.to_string(),
            message: format!("{err:#}"),
        }
    }

    pub fn postcondition(action: &str, err: &anyhow::Error) -> Self {
        Self::PostconditionWriteFailed {
            action: action.to_string(),
            message: format!("{err:#}"),
        }
    }

    pub fn secret(action: &str, err: &anyhow::Error) -> Self {
        Self::SecretResolutionFailed {
            action: action.to_string(),
            message: format!("{err:#}"),
        }
    }

    #[must_use]
    pub fn action(&self) -> &str {
        match self {
            Self::PreconditionCheckFailed { action, .. }
            | Self::EffectFailed { action, .. }
            | Self::PostconditionWriteFailed { action, .. }
            | Self::SecretResolutionFailed { action, .. } => action,
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::PreconditionCheckFailed { message, .. }
            | Self::EffectFailed { message, .. }
            | Self::PostconditionWriteFailed { message, .. }
            | Self::SecretResolutionFailed { message, .. } => message,
        }
    }

    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::PreconditionCheckFailed { .. } => FailureKind::PreconditionCheckFailed,
            Self::EffectFailed { .. } => FailureKind::EffectFailed,
            Self::PostconditionWriteFailed { .. } => FailureKind::PostconditionWriteFailed,
            Self::SecretResolutionFailed { .. } => FailureKind::SecretResolutionFailed,
        }
    }
}

impl From<&ReconcileError> for RunFailure {
    fn from(err: &ReconcileError) -> Self {
        RunFailure {
            action_key: err.action().to_string(),
            kind: err.kind(),
            message: err.message().to_string(),
            requires_manual_reconciliation: matches!(
                err,
                ReconcileError::PostconditionWriteFailed { .. }
            ),
        }
    }
}

/// Errors related to the tool's own configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown setting: {key}\n\nValid settings: {valid}")]
    UnknownKey { key: String, valid: String },

    #[error("Invalid value for {key}: {value} ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}
