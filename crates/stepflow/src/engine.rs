//! Execution engine - runs steps in order and persists progress after each
//!
//! Steps run strictly one after another. The first failure stops the pass.
//! Completion of a step is written to the store before the next one
//! starts, so a restarted pass resumes at the first incomplete step.

use crate::context::{NoProgress, ProgressCallback, StepContext};
use crate::deps::Deps;
use crate::error::{Error, Result};
use crate::state::StateStore;
use crate::step::BoxedStep;
use hostexec::{CommandRunner, RetryPolicy};

/// Options for an engine run
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Fingerprint of the step list; persisted state from another plan is refused
    pub plan: Option<String>,
    /// Retry policy handed to steps for image pulls
    pub pull_policy: RetryPolicy,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            plan: None,
            pull_policy: RetryPolicy::image_pull(),
        }
    }
}

impl ExecuteOptions {
    pub fn with_plan(mut self, plan: impl Into<String>) -> Self {
        self.plan = Some(plan.into());
        self
    }

    pub fn with_pull_policy(mut self, policy: RetryPolicy) -> Self {
        self.pull_policy = policy;
        self
    }
}

/// Summary of a successful engine run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Steps in the plan
    pub total: usize,
    /// Steps run to completion during this pass
    pub completed: usize,
    /// Steps already complete from an earlier pass
    pub skipped: usize,
}

/// Run every incomplete step in `steps`
///
/// # Arguments
/// * `steps` - The plan, in order
/// * `deps` - Tool paths shared by all steps
/// * `runner` - Runs external commands on behalf of steps
/// * `store` - Where progress is loaded from and written back to
/// * `opts` - Plan fingerprint and pull policy
/// * `progress` - Progress callback
///
/// # Returns
/// Summary of the pass, or the first error. Configuration errors in any
/// pending step are reported before any step runs.
pub fn execute<P: ProgressCallback>(
    steps: &mut [BoxedStep],
    deps: &Deps,
    runner: &dyn CommandRunner,
    store: &mut dyn StateStore,
    opts: &ExecuteOptions,
    progress: &mut P,
) -> Result<RunSummary> {
    let mut state = store.load()?;
    let total = steps.len();

    if let Some(current) = &opts.plan {
        match &state.plan {
            Some(stored) if stored != current && !state.completed.is_empty() => {
                return Err(Error::PlanMismatch {
                    stored: stored.clone(),
                    current: current.clone(),
                });
            }
            _ => state.plan = Some(current.clone()),
        }
    }

    let start = state.next_step().min(total);
    let mut summary = RunSummary {
        total,
        ..Default::default()
    };

    for (index, step) in steps.iter().enumerate().take(start) {
        progress.on_step_skipped(index, step.step_type());
        summary.skipped += 1;
    }

    if start == total {
        log::info!("All {total} steps already complete");
        return Ok(summary);
    }

    // Fail fast on configuration before touching the host
    for step in &steps[start..] {
        step.validate()?;
    }

    for (index, step) in steps.iter_mut().enumerate().skip(start) {
        let step_type = step.step_type();
        progress.on_step_start(index, total, step_type);

        step.set_defaults();
        let result = {
            let mut ctx = StepContext::new(index, deps, runner, &mut state)
                .with_pull_policy(opts.pull_policy.clone());
            step.run(&mut ctx)
        };

        if let Err(source) = result {
            progress.on_step_failed(index, step_type, &source);
            return Err(Error::StepFailed {
                index,
                step: step_type.to_string(),
                source,
            });
        }

        state.mark_complete(index, step_type);
        store.save(&state)?;
        progress.on_step_complete(index, step_type);
        summary.completed += 1;
    }

    Ok(summary)
}

/// Simple execution without progress reporting or plan checks
pub fn execute_simple(
    steps: &mut [BoxedStep],
    deps: &Deps,
    runner: &dyn CommandRunner,
    store: &mut dyn StateStore,
) -> Result<RunSummary> {
    execute(
        steps,
        deps,
        runner,
        store,
        &ExecuteOptions::default(),
        &mut NoProgress,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{MemoryStateStore, State};
    use crate::step::Step;
    use hostexec::{Invocation, ScriptedRunner};
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Records which phases ran, in order, across all test steps
    type Journal = Rc<RefCell<Vec<String>>>;

    #[derive(Debug)]
    struct TestStep {
        name: &'static str,
        valid: bool,
        fail: bool,
        defaulted: bool,
        journal: Journal,
    }

    impl TestStep {
        fn boxed(name: &'static str, journal: &Journal) -> BoxedStep {
            Box::new(Self {
                name,
                valid: true,
                fail: false,
                defaulted: false,
                journal: journal.clone(),
            })
        }

        fn failing(name: &'static str, journal: &Journal) -> BoxedStep {
            Box::new(Self {
                name,
                valid: true,
                fail: true,
                defaulted: false,
                journal: journal.clone(),
            })
        }

        fn invalid(name: &'static str, journal: &Journal) -> BoxedStep {
            Box::new(Self {
                name,
                valid: false,
                fail: false,
                defaulted: false,
                journal: journal.clone(),
            })
        }
    }

    impl Step for TestStep {
        fn step_type(&self) -> &'static str {
            self.name
        }

        fn validate(&self) -> Result<()> {
            self.journal
                .borrow_mut()
                .push(format!("validate {}", self.name));
            if self.valid {
                Ok(())
            } else {
                Err(Error::invalid_args(self.name, "field is required"))
            }
        }

        fn set_defaults(&mut self) {
            self.defaulted = true;
            self.journal
                .borrow_mut()
                .push(format!("default {}", self.name));
        }

        fn run(&self, ctx: &mut StepContext<'_>) -> anyhow::Result<()> {
            assert!(self.defaulted, "run before set_defaults");
            self.journal.borrow_mut().push(format!("run {}", self.name));
            ctx.put_data("ran", "yes");
            ctx.runner()
                .run(&Invocation::new("/bin/echo").arg(self.name))?;
            if self.fail {
                anyhow::bail!("{} broke", self.name);
            }
            Ok(())
        }
    }

    fn journal() -> Journal {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn test_empty_plan() {
        let mut store = MemoryStateStore::new();
        let summary =
            execute_simple(&mut [], &Deps::default(), &ScriptedRunner::new(), &mut store).unwrap();

        assert_eq!(summary, RunSummary::default());
        assert_eq!(store.save_count(), 0);
    }

    #[test]
    fn test_runs_all_steps_in_order() {
        let j = journal();
        let mut steps = vec![TestStep::boxed("A", &j), TestStep::boxed("B", &j)];
        let runner = ScriptedRunner::new();
        let mut store = MemoryStateStore::new();

        let summary = execute_simple(&mut steps, &Deps::default(), &runner, &mut store).unwrap();

        assert_eq!(summary.completed, 2);
        assert_eq!(summary.skipped, 0);
        assert_eq!(
            *j.borrow(),
            vec![
                "validate A",
                "validate B",
                "default A",
                "run A",
                "default B",
                "run B"
            ]
        );
        assert_eq!(runner.command_lines(), vec!["/bin/echo A", "/bin/echo B"]);

        // One durable write per completed step
        assert_eq!(store.save_count(), 2);
        let saved = store.saved().unwrap();
        assert_eq!(saved.next_step(), 2);
        assert_eq!(saved.data(1, "ran"), Some("yes"));
    }

    #[test]
    fn test_failure_stops_and_keeps_last_completed_step() {
        let j = journal();
        let mut steps = vec![
            TestStep::boxed("A", &j),
            TestStep::failing("B", &j),
            TestStep::boxed("C", &j),
        ];
        let mut store = MemoryStateStore::new();

        let err = execute_simple(
            &mut steps,
            &Deps::default(),
            &ScriptedRunner::new(),
            &mut store,
        )
        .unwrap_err();

        match &err {
            Error::StepFailed { index, step, .. } => {
                assert_eq!(*index, 1);
                assert_eq!(step, "B");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!j.borrow().contains(&"run C".to_string()));

        // Only A's completion reached the store; B's working data did not
        let saved = store.saved().unwrap();
        assert_eq!(saved.next_step(), 1);
        assert_eq!(saved.data(1, "ran"), None);
    }

    #[test]
    fn test_resume_skips_completed_steps() {
        let j = journal();
        let mut steps = vec![
            TestStep::boxed("A", &j),
            TestStep::boxed("B", &j),
            TestStep::boxed("C", &j),
        ];
        let mut state = State::default();
        state.mark_complete(0, "A");
        state.mark_complete(1, "B");
        let mut store = MemoryStateStore::with_state(state);
        let runner = ScriptedRunner::new();
        let mut progress = RecordingProgress::default();

        let summary = execute(
            &mut steps,
            &Deps::default(),
            &runner,
            &mut store,
            &ExecuteOptions::default(),
            &mut progress,
        )
        .unwrap();

        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.completed, 1);
        assert_eq!(*j.borrow(), vec!["validate C", "default C", "run C"]);
        assert_eq!(runner.command_lines(), vec!["/bin/echo C"]);
        assert_eq!(
            progress.events,
            vec!["skip 0", "skip 1", "start 2/3", "complete 2"]
        );
    }

    #[test]
    fn test_all_complete_runs_nothing() {
        let j = journal();
        let mut steps = vec![TestStep::boxed("A", &j)];
        let mut state = State::default();
        state.mark_complete(0, "A");
        let mut store = MemoryStateStore::with_state(state);

        let summary = execute_simple(
            &mut steps,
            &Deps::default(),
            &ScriptedRunner::new(),
            &mut store,
        )
        .unwrap();

        assert_eq!(summary.skipped, 1);
        assert!(j.borrow().is_empty());
        assert_eq!(store.save_count(), 0);
    }

    #[test]
    fn test_invalid_step_fails_before_side_effects() {
        let j = journal();
        let mut steps = vec![TestStep::boxed("A", &j), TestStep::invalid("B", &j)];
        let runner = ScriptedRunner::new();
        let mut store = MemoryStateStore::new();

        let err = execute_simple(&mut steps, &Deps::default(), &runner, &mut store).unwrap_err();

        assert!(err.is_config_error());
        assert!(runner.calls().is_empty());
        assert_eq!(store.save_count(), 0);
        assert!(!j.borrow().iter().any(|e| e.starts_with("run")));
    }

    #[test]
    fn test_plan_mismatch_is_refused() {
        let j = journal();
        let mut steps = vec![TestStep::boxed("A", &j), TestStep::boxed("B", &j)];
        let mut state = State {
            plan: Some("old".to_string()),
            ..State::default()
        };
        state.mark_complete(0, "A");
        let mut store = MemoryStateStore::with_state(state);

        let err = execute(
            &mut steps,
            &Deps::default(),
            &ScriptedRunner::new(),
            &mut store,
            &ExecuteOptions::default().with_plan("new"),
            &mut NoProgress,
        )
        .unwrap_err();

        assert!(matches!(err, Error::PlanMismatch { .. }));
        assert!(j.borrow().is_empty());
    }

    #[test]
    fn test_plan_is_recorded() {
        let j = journal();
        let mut steps = vec![TestStep::boxed("A", &j)];
        let mut store = MemoryStateStore::new();

        execute(
            &mut steps,
            &Deps::default(),
            &ScriptedRunner::new(),
            &mut store,
            &ExecuteOptions::default().with_plan("fingerprint"),
            &mut NoProgress,
        )
        .unwrap();

        assert_eq!(
            store.saved().unwrap().plan.as_deref(),
            Some("fingerprint")
        );
    }

    #[test]
    fn test_file_store_resume_across_passes() {
        let dir = tempfile::tempdir().unwrap();
        let j = journal();

        // First pass: B fails
        {
            let mut steps = vec![TestStep::boxed("A", &j), TestStep::failing("B", &j)];
            let mut store = crate::state::FileStateStore::new(dir.path());
            assert!(
                execute_simple(
                    &mut steps,
                    &Deps::default(),
                    &ScriptedRunner::new(),
                    &mut store
                )
                .is_err()
            );
        }
        j.borrow_mut().clear();

        // Second pass after "reboot": B fixed, A not rerun
        let mut steps = vec![TestStep::boxed("A", &j), TestStep::boxed("B", &j)];
        let mut store = crate::state::FileStateStore::new(dir.path());
        let summary = execute_simple(
            &mut steps,
            &Deps::default(),
            &ScriptedRunner::new(),
            &mut store,
        )
        .unwrap();

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.completed, 1);
        assert_eq!(*j.borrow(), vec!["validate B", "default B", "run B"]);
    }

    #[derive(Default)]
    struct RecordingProgress {
        events: Vec<String>,
    }

    impl ProgressCallback for RecordingProgress {
        fn on_step_skipped(&mut self, index: usize, _step_type: &str) {
            self.events.push(format!("skip {index}"));
        }
        fn on_step_start(&mut self, index: usize, total: usize, _step_type: &str) {
            self.events.push(format!("start {index}/{total}"));
        }
        fn on_step_complete(&mut self, index: usize, _step_type: &str) {
            self.events.push(format!("complete {index}"));
        }
        fn on_step_failed(&mut self, index: usize, _step_type: &str, _error: &anyhow::Error) {
            self.events.push(format!("fail {index}"));
        }
    }
}
