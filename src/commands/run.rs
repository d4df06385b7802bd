use anyhow::{Context as _, Result, bail};
use colored::Colorize;
use std::path::Path;
use stepflow::{ExecuteOptions, FileStateStore, LogProgress, StateStore};

use crate::Context;
use crate::cli::{DepsArgs, RunArgs};
use crate::config::ProvisionConfig;
use crate::deps;
use crate::paths;
use crate::ui;

/// Start a pass from a config file, or continue it if it was interrupted
pub fn run(ctx: &Context, state_dir: &Path, args: RunArgs) -> Result<()> {
    let config = ProvisionConfig::load(&args.config)?;
    let plan = config.fingerprint()?;

    let store = FileStateStore::new(state_dir);
    let state = store.load()?;
    if let Some(stored) = &state.plan
        && *stored != plan
        && !state.completed.is_empty()
    {
        bail!(
            "{} holds progress for a different config; run `provisioner reset` first",
            state_dir.display()
        );
    }

    // Snapshot before any step runs so a restart can resume without the config file
    config.save(&paths::config_snapshot(state_dir))?;

    provision(ctx, state_dir, config, plan, &args.deps)
}

/// Continue the pass recorded in the state directory
pub fn resume(ctx: &Context, state_dir: &Path, args: DepsArgs) -> Result<()> {
    let snapshot = paths::config_snapshot(state_dir);
    if !snapshot.exists() {
        bail!(
            "No provisioning pass recorded in {}; start one with `provisioner run --config <file>`",
            state_dir.display()
        );
    }

    let config = ProvisionConfig::load(&snapshot)?;
    let plan = config.fingerprint()?;
    provision(ctx, state_dir, config, plan, &args)
}

fn provision(
    ctx: &Context,
    state_dir: &Path,
    config: ProvisionConfig,
    plan: String,
    deps_args: &DepsArgs,
) -> Result<()> {
    let deps = deps::resolve(deps_args);
    log::debug!("Using {deps:?}");

    let mut steps = config.into_steps();
    let mut store = FileStateStore::new(state_dir);
    let opts = ExecuteOptions::default().with_plan(plan);

    let summary = stepflow::execute(
        &mut steps,
        &deps,
        &hostexec::SystemRunner,
        &mut store,
        &opts,
        &mut LogProgress,
    )
    .context("Provisioning failed")?;

    if !ctx.quiet {
        ui::success(&format!(
            "Provisioning complete: {} run, {} already done, {} total",
            summary.completed.to_string().green(),
            summary.skipped.to_string().dimmed(),
            summary.total.to_string().bold()
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use stepflow::State;

    const CONFIG: &str = r#"{"Steps": [{"Type": "StopServices", "Args": {"Units": ["a.service"]}}]}"#;

    fn quiet() -> Context {
        Context {
            verbose: 0,
            quiet: true,
        }
    }

    #[test]
    fn test_resume_without_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let err = resume(&quiet(), dir.path(), DepsArgs::default()).unwrap_err();
        assert!(err.to_string().contains("No provisioning pass recorded"));
    }

    #[test]
    fn test_run_refuses_foreign_progress() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("steps.json");
        fs::write(&config_path, CONFIG).unwrap();

        let mut store = FileStateStore::new(dir.path().join("state"));
        let mut state = State {
            plan: Some("another-plan".to_string()),
            ..State::default()
        };
        state.mark_complete(0, "StopServices");
        store.save(&state).unwrap();

        let args = RunArgs {
            config: config_path,
            deps: DepsArgs::default(),
        };
        let err = run(&quiet(), store.dir(), args).unwrap_err();

        assert!(err.to_string().contains("provisioner reset"));
        assert!(!paths::config_snapshot(store.dir()).exists());
    }

    #[test]
    fn test_run_with_everything_done_only_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("steps.json");
        fs::write(&config_path, CONFIG).unwrap();
        let config = ProvisionConfig::load(&config_path).unwrap();

        let state_dir = dir.path().join("state");
        let mut store = FileStateStore::new(&state_dir);
        let mut state = State {
            plan: Some(config.fingerprint().unwrap()),
            ..State::default()
        };
        state.mark_complete(0, "StopServices");
        store.save(&state).unwrap();

        let args = RunArgs {
            config: config_path,
            deps: DepsArgs::default(),
        };
        run(&quiet(), &state_dir, args).unwrap();

        assert_eq!(
            ProvisionConfig::load(&paths::config_snapshot(&state_dir)).unwrap(),
            config
        );
    }
}
