//! Error types for step execution and persisted state.

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the engine, steps' validation, and state stores.
#[derive(Debug, Error)]
pub enum Error {
    /// A step's configuration is incomplete or malformed
    #[error("invalid args: {message} in {step}")]
    InvalidArgs { step: String, message: String },

    /// A step failed while running
    #[error("step {index} ({step}) failed: {source:#}")]
    StepFailed {
        index: usize,
        step: String,
        #[source]
        source: anyhow::Error,
    },

    /// Persisted state belongs to a different list of steps
    #[error(
        "state was recorded for provisioning plan {stored}, but the current plan is {current}; reset the state directory to start over"
    )]
    PlanMismatch { stored: String, current: String },

    #[error("failed to read state file {}: {source}", .path.display())]
    StateRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write state file {}: {source}", .path.display())]
    StateWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse state file {}: {source}", .path.display())]
    StateParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize state: {0}")]
    StateSerialize(#[from] toml::ser::Error),
}

impl Error {
    /// Shorthand for [`Error::InvalidArgs`].
    pub fn invalid_args(step: &str, message: impl Into<String>) -> Self {
        Self::InvalidArgs {
            step: step.to_string(),
            message: message.into(),
        }
    }

    /// Whether this is a configuration problem, detected before any side effect.
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::InvalidArgs { .. } | Self::PlanMismatch { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_args_message() {
        let err = Error::invalid_args("InstallGPU", "NvidiaDriverVersion is required");
        assert_eq!(
            err.to_string(),
            "invalid args: NvidiaDriverVersion is required in InstallGPU"
        );
        assert!(err.is_config_error());
    }

    #[test]
    fn test_step_failed_includes_cause_chain() {
        let source = anyhow::anyhow!("exit status: 1").context("pulling installer image");
        let err = Error::StepFailed {
            index: 2,
            step: "InstallGPU".to_string(),
            source,
        };
        let msg = err.to_string();
        assert!(msg.starts_with("step 2 (InstallGPU) failed"));
        assert!(msg.contains("pulling installer image: exit status: 1"));
        assert!(!err.is_config_error());
    }
}
