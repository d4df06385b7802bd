use anyhow::{Context as _, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use stepflow::{FileStateStore, StateStore};

use crate::Context;
use crate::paths;
use crate::ui;

/// Forget recorded progress and the config snapshot
pub fn run(ctx: &Context, state_dir: &Path) -> Result<()> {
    FileStateStore::new(state_dir).clear()?;

    let snapshot = paths::config_snapshot(state_dir);
    match fs::remove_file(&snapshot) {
        Ok(()) => log::debug!("Removed {}", snapshot.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => {
            return Err(e).with_context(|| format!("Could not remove {}", snapshot.display()));
        }
    }

    if !ctx.quiet {
        ui::success(&format!("Cleared provisioning state in {}", state_dir.display()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProvisionConfig;
    use stepflow::State;

    #[test]
    fn test_reset_clears_state_and_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStateStore::new(dir.path());
        let mut state = State::default();
        state.mark_complete(0, "StopServices");
        store.save(&state).unwrap();
        ProvisionConfig::default()
            .save(&paths::config_snapshot(dir.path()))
            .unwrap();

        let ctx = Context {
            verbose: 0,
            quiet: true,
        };
        run(&ctx, dir.path()).unwrap();

        assert!(!store.state_file().exists());
        assert!(!paths::config_snapshot(dir.path()).exists());
        // Nothing left to clear is not an error
        run(&ctx, dir.path()).unwrap();
    }
}
