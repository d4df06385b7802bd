//! Resolved external tools shared by every step.

use std::path::{Path, PathBuf};

/// Paths of the external programs steps drive, plus the root filesystem.
///
/// Built once per provisioning pass and handed to steps read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deps {
    /// Container runtime binary
    pub docker: PathBuf,
    /// Journal reader binary
    pub journalctl: PathBuf,
    /// `mount` binary
    pub mount: PathBuf,
    /// Init-control binary
    pub systemctl: PathBuf,
    /// Root of the filesystem being provisioned (`/` outside of tests)
    pub root_dir: PathBuf,
}

impl Default for Deps {
    fn default() -> Self {
        Self {
            docker: PathBuf::from("/usr/bin/docker"),
            journalctl: PathBuf::from("/usr/bin/journalctl"),
            mount: PathBuf::from("/bin/mount"),
            systemctl: PathBuf::from("/usr/bin/systemctl"),
            root_dir: PathBuf::from("/"),
        }
    }
}

impl Deps {
    /// Default tool paths with a different root directory.
    pub fn with_root(root_dir: impl AsRef<Path>) -> Self {
        Self {
            root_dir: root_dir.as_ref().to_path_buf(),
            ..Default::default()
        }
    }
}
