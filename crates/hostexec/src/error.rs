//! Error types for external command execution.
//!
//! Errors are categorized so callers can decide what to retry. A command
//! that could not be started and a command that exited non-zero are the
//! same kind of failure: both carry the offending command line.

use std::path::PathBuf;
use thiserror::Error;

/// Categories of errors for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// An external command failed to start or exited unsuccessfully
    Command,
    /// The process table could not be read
    ProcessTable,
    /// The caller built an invocation with no program
    Usage,
}

impl ErrorCategory {
    /// Whether an operation failing with this category may succeed if repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Command)
    }
}

/// Errors that can occur while driving external programs.
#[derive(Debug, Error)]
pub enum Error {
    /// The command could not be spawned or exited with a failure status
    #[error("command `{command}` failed: {reason}{}", format_output(.output))]
    CommandFailed {
        /// The full command line that was executed
        command: String,
        /// Why it failed (exit status, signal, or spawn error)
        reason: String,
        /// Combined stdout and stderr captured from the process
        output: String,
    },

    /// Reading a `cmdline` entry (or listing the table itself) failed
    #[error("cannot read process table at {}: {source}", .path.display())]
    ProcessTable {
        /// The path that could not be read
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// An invocation was run without a program
    #[error("empty command line")]
    EmptyCommand,
}

impl Error {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::CommandFailed { .. } => ErrorCategory::Command,
            Error::ProcessTable { .. } => ErrorCategory::ProcessTable,
            Error::EmptyCommand => ErrorCategory::Usage,
        }
    }

    /// Whether this error is worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// The command line attached to a command failure, if any.
    pub fn command(&self) -> Option<&str> {
        match self {
            Error::CommandFailed { command, .. } => Some(command),
            _ => None,
        }
    }
}

fn format_output(output: &str) -> String {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("\n{trimmed}")
    }
}

/// Result type for host command operations.
pub type Result<T> = std::result::Result<T, Error>;
