//! # hostexec
//!
//! External command plumbing for provisioning a running host.
//!
//! This crate provides:
//! - A [`CommandRunner`] abstraction over spawning external programs
//! - A bounded [`retry`] policy with attempt and exhaustion hooks
//! - A [`DockerClient`] for pulling and running container images
//! - A [`SystemdClient`] for querying and idempotently stopping units
//! - [`process_exists`] for scanning a `proc` table by command line
//!
//! ## Example
//!
//! ```no_run
//! use hostexec::{DockerClient, SystemRunner};
//!
//! let runner = SystemRunner;
//! let docker = DockerClient::new(&runner, "/usr/bin/docker", "/usr/bin/journalctl");
//!
//! // Retries up to 10 times, then dumps the docker journal
//! docker.pull(&["gcr.io/example/gpu-installer:latest"]).expect("pull failed");
//! ```
//!
//! ## Testing
//!
//! Every client takes a `&dyn CommandRunner`, so tests can substitute
//! [`ScriptedRunner`], which records invocations and fails the ones it is
//! told to instead of spawning anything.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod docker;
pub mod error;
pub mod process;
pub mod retry;
pub mod runner;
pub mod systemd;

pub use docker::DockerClient;
pub use error::{Error, ErrorCategory, Result};
pub use process::process_exists;
pub use retry::{NoCallback, RetryCallback, RetryPolicy, with_retry};
pub use runner::{CommandOutput, CommandRunner, Invocation, ScriptedRunner, SystemRunner};
pub use systemd::SystemdClient;
