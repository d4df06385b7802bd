//! Step context and progress callbacks
//!
//! The context is how a running step reaches the outside world: tool paths,
//! the command runner, and its own slice of persisted state.

use crate::deps::Deps;
use crate::state::State;
use hostexec::{CommandRunner, DockerClient, RetryPolicy, SystemdClient};

/// Context passed to [`Step::run`](crate::Step::run)
pub struct StepContext<'a> {
    index: usize,
    deps: &'a Deps,
    runner: &'a dyn CommandRunner,
    state: &'a mut State,
    pull_policy: RetryPolicy,
}

impl<'a> StepContext<'a> {
    /// Create a context for the step at `index`
    pub fn new(
        index: usize,
        deps: &'a Deps,
        runner: &'a dyn CommandRunner,
        state: &'a mut State,
    ) -> Self {
        Self {
            index,
            deps,
            runner,
            state,
            pull_policy: RetryPolicy::image_pull(),
        }
    }

    /// Override the retry policy for image pulls
    pub fn with_pull_policy(mut self, policy: RetryPolicy) -> Self {
        self.pull_policy = policy;
        self
    }

    pub fn deps(&self) -> &'a Deps {
        self.deps
    }

    pub fn runner(&self) -> &'a dyn CommandRunner {
        self.runner
    }

    /// Container runtime client wired to this pass's tools
    pub fn docker(&self) -> DockerClient<'a> {
        DockerClient::new(self.runner, &self.deps.docker, &self.deps.journalctl)
            .with_pull_policy(self.pull_policy.clone())
    }

    /// Init-system client wired to this pass's tools
    pub fn systemd(&self) -> SystemdClient<'a> {
        SystemdClient::new(self.runner, &self.deps.systemctl)
    }

    /// Record working data for this step; persisted when the step completes
    pub fn put_data(&mut self, key: &str, value: impl Into<String>) {
        self.state.put_data(self.index, key, value);
    }

    /// Working data recorded for this step on an earlier pass or earlier in this one
    pub fn data(&self, key: &str) -> Option<&str> {
        self.state.data(self.index, key)
    }
}

/// Progress callback for engine runs
///
/// Implement this trait to receive updates as steps run.
pub trait ProgressCallback {
    /// Called for each step already completed on an earlier pass
    fn on_step_skipped(&mut self, index: usize, step_type: &str);

    /// Called before a step runs
    fn on_step_start(&mut self, index: usize, total: usize, step_type: &str);

    /// Called after a step completed and its completion was persisted
    fn on_step_complete(&mut self, index: usize, step_type: &str);

    /// Called when a step fails; no later step will run
    fn on_step_failed(&mut self, index: usize, step_type: &str, error: &anyhow::Error);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_step_skipped(&mut self, _index: usize, _step_type: &str) {}
    fn on_step_start(&mut self, _index: usize, _total: usize, _step_type: &str) {}
    fn on_step_complete(&mut self, _index: usize, _step_type: &str) {}
    fn on_step_failed(&mut self, _index: usize, _step_type: &str, _error: &anyhow::Error) {}
}

/// Progress callback that writes to the log
pub struct LogProgress;

impl ProgressCallback for LogProgress {
    fn on_step_skipped(&mut self, index: usize, step_type: &str) {
        log::info!("Step {index} ({step_type}) already complete, skipping");
    }

    fn on_step_start(&mut self, index: usize, total: usize, step_type: &str) {
        log::info!("Running step {index} ({step_type}) [{}/{total}]", index + 1);
    }

    fn on_step_complete(&mut self, index: usize, step_type: &str) {
        log::info!("Step {index} ({step_type}) complete");
    }

    fn on_step_failed(&mut self, index: usize, step_type: &str, error: &anyhow::Error) {
        log::error!("Step {index} ({step_type}) failed: {error:#}");
    }
}
