//! Resolve external tool paths for a provisioning pass

use crate::cli::DepsArgs;
use std::path::{Path, PathBuf};
use stepflow::Deps;

/// Build [`Deps`] from command-line overrides
///
/// An explicit path wins; otherwise the tool is looked up in PATH, and
/// failing that its usual location is assumed.
pub fn resolve(args: &DepsArgs) -> Deps {
    let defaults = Deps::default();
    Deps {
        docker: pick(args.docker.as_deref(), "docker", defaults.docker),
        journalctl: pick(args.journalctl.as_deref(), "journalctl", defaults.journalctl),
        mount: pick(args.mount.as_deref(), "mount", defaults.mount),
        systemctl: pick(args.systemctl.as_deref(), "systemctl", defaults.systemctl),
        root_dir: args.root_dir.clone(),
    }
}

fn pick(explicit: Option<&Path>, name: &str, fallback: PathBuf) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    match which::which(name) {
        Ok(path) => {
            log::debug!("Found {name} at {}", path.display());
            path
        }
        Err(_) => {
            log::debug!("{name} not in PATH, assuming {}", fallback.display());
            fallback
        }
    }
}
