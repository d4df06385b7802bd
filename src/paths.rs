//! Locations inside the state directory
//!
//! # Environment Variables
//!
//! - `PROVISIONER_STATE_DIR` - Override the state directory
//!
//! # Layout
//!
//! ```text
//! <state-dir>/
//!   state.toml     completed steps and per-step data
//!   config.json    snapshot of the config the pass was started with
//! ```

use std::path::{Path, PathBuf};

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "PROVISIONER_STATE_DIR";

/// State directory when none is given
pub const DEFAULT_STATE_DIR: &str = "/var/lib/.cos-customizer";

const CONFIG_SNAPSHOT: &str = "config.json";

/// Copy of the config a pass runs from, so `resume` needs no arguments
pub fn config_snapshot(state_dir: &Path) -> PathBuf {
    state_dir.join(CONFIG_SNAPSHOT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_snapshot_lives_in_state_dir() {
        assert_eq!(
            config_snapshot(Path::new(DEFAULT_STATE_DIR)),
            PathBuf::from("/var/lib/.cos-customizer/config.json")
        );
    }
}
