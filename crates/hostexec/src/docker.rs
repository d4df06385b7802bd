//! Container runtime client.
//!
//! Wraps the `docker` CLI. `run` failures are surfaced as-is; `pull` is
//! retried because the network may still be coming up when provisioning
//! starts at boot.

use crate::error::{Error, Result};
use crate::retry::{RetryCallback, RetryPolicy, with_retry};
use crate::runner::{CommandRunner, Invocation};
use std::ffi::OsStr;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Systemd unit whose journal is dumped when pulls keep failing.
pub const DOCKER_UNIT: &str = "docker.service";

/// Client for the container runtime.
pub struct DockerClient<'a> {
    runner: &'a dyn CommandRunner,
    docker: PathBuf,
    journalctl: PathBuf,
    pull_policy: RetryPolicy,
}

impl<'a> DockerClient<'a> {
    /// Create a client using the given `docker` and `journalctl` binaries.
    pub fn new(
        runner: &'a dyn CommandRunner,
        docker: impl AsRef<Path>,
        journalctl: impl AsRef<Path>,
    ) -> Self {
        Self {
            runner,
            docker: docker.as_ref().to_path_buf(),
            journalctl: journalctl.as_ref().to_path_buf(),
            pull_policy: RetryPolicy::image_pull(),
        }
    }

    /// Replace the retry policy used by [`pull`](Self::pull).
    pub fn with_pull_policy(mut self, policy: RetryPolicy) -> Self {
        self.pull_policy = policy;
        self
    }

    /// Run `docker run <args>` with `env` layered over the inherited environment.
    ///
    /// Not retried: a failing container is not a transient condition.
    pub fn run<S: AsRef<OsStr>>(&self, args: &[S], env: &[(String, String)]) -> Result<()> {
        let invocation = Invocation::new(&self.docker)
            .arg("run")
            .args(args)
            .envs(env.iter().cloned());
        self.runner.run(&invocation)?;
        Ok(())
    }

    /// Run `docker pull <args>`, retrying per the pull policy.
    ///
    /// After the final failed attempt the docker journal is written to
    /// stdout as a diagnostic; the pull error is returned either way.
    pub fn pull<S: AsRef<OsStr>>(&self, args: &[S]) -> Result<()> {
        let invocation = Invocation::new(&self.docker).arg("pull").args(args);
        let callback = PullCallback {
            client: self,
            command: invocation.command_line(),
        };

        with_retry(&self.pull_policy, Some(&callback), || {
            self.runner.run(&invocation)
        })?;

        log::info!("Successfully ran command {}", callback.command);
        Ok(())
    }

    /// Best-effort dump of the docker unit's journal to stdout.
    fn dump_journal(&self) {
        let invocation = Invocation::new(&self.journalctl).args(["-u", DOCKER_UNIT, "--no-pager"]);
        match self.runner.run(&invocation) {
            Ok(out) => {
                let mut stdout = std::io::stdout().lock();
                if let Err(e) = stdout.write_all(out.output.as_bytes()) {
                    log::warn!("Cannot write {DOCKER_UNIT} journal to stdout: {e}");
                }
            }
            Err(e) => log::warn!("Cannot read {DOCKER_UNIT} journal: {e}"),
        }
    }
}

struct PullCallback<'c, 'a> {
    client: &'c DockerClient<'a>,
    command: String,
}

impl RetryCallback for PullCallback<'_, '_> {
    fn on_attempt(&self, attempt: u32, max_attempts: u32) {
        log::info!("Running command {}... [{attempt}/{max_attempts}]", self.command);
    }

    fn on_retry(&self, _attempt: u32, _max_attempts: u32, error: &Error, delay: Duration) {
        log::warn!("{error}");
        log::debug!("Next pull attempt in {:.1}s", delay.as_secs_f64());
    }

    fn on_exhausted(&self, _attempts: u32, _error: &Error) {
        log::error!("Command {} failed. See stdout for journal logs.", self.command);
        self.client.dump_journal();
    }
}
