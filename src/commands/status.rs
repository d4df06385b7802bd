use anyhow::Result;
use colored::Colorize;
use std::path::Path;
use stepflow::{FileStateStore, State, StateStore};

use crate::Context;
use crate::config::ProvisionConfig;
use crate::paths;
use crate::ui;

pub fn run(_ctx: &Context, state_dir: &Path) -> Result<()> {
    let store = FileStateStore::new(state_dir);
    let state = store.load()?;

    ui::header("Provisioning Status");
    ui::kv("State", &store.state_file().display().to_string());
    ui::kv(
        "Updated",
        &state
            .last_updated
            .format("%Y-%m-%d %H:%M:%S UTC")
            .to_string(),
    );

    let snapshot = paths::config_snapshot(state_dir);
    if !snapshot.exists() {
        println!();
        ui::info("No provisioning pass recorded");
        return Ok(());
    }

    let config = ProvisionConfig::load(&snapshot)?;
    if let Some(plan) = &state.plan
        && *plan != config.fingerprint()?
    {
        ui::warn("Recorded progress belongs to a different config");
    }

    ui::section("Steps");
    for line in step_lines(&config, &state) {
        println!("{line}");
    }

    let total = config.steps.len();
    let done = (0..total).filter(|i| state.is_complete(*i)).count();
    println!();
    ui::kv(
        "Progress",
        &format!("{}/{} steps complete", done.to_string().bold(), total),
    );
    Ok(())
}

fn step_lines(config: &ProvisionConfig, state: &State) -> Vec<String> {
    let mut lines = Vec::new();
    for (index, step) in config.steps.iter().enumerate() {
        let record = state.completed.iter().find(|r| r.index == index);
        let marker = if record.is_some() {
            "✓".green()
        } else {
            "○".dimmed()
        };
        let when = record
            .map(|r| format!(" ({})", r.completed_at.format("%Y-%m-%d %H:%M:%S")))
            .unwrap_or_default();
        lines.push(format!(
            "  {marker} {index}: {}{}",
            step.step_type(),
            when.dimmed()
        ));

        for (key, value) in state.step_data(index) {
            lines.push(format!("      {}: {value}", key.dimmed()));
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_lines() {
        colored::control::set_override(false);
        let config = ProvisionConfig::from_json(
            r#"{"Steps": [
                {"Type": "StopServices", "Args": {"Units": ["a.service"]}},
                {"Type": "InstallGPU", "Args": {"NvidiaDriverVersion": "450.51.06", "NvidiaInstallerContainer": "img"}}
            ]}"#,
        )
        .unwrap();
        let mut state = State::default();
        state.mark_complete(0, "StopServices");
        state.put_data(1, "driver_version", "450.51.06");

        let lines = step_lines(&config, &state);

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("  ✓ 0: StopServices ("));
        assert_eq!(lines[1], "  ○ 1: InstallGPU");
        assert_eq!(lines[2], "      driver_version: 450.51.06");
    }
}
