//! Process table scanning.

use crate::error::{Error, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// Check whether any process under `root_dir/proc` has `name` in its command line.
///
/// Reads every `<root_dir>/proc/<entry>/cmdline`, turns the NUL argument
/// separators into spaces, and returns `true` at the first entry containing
/// `name`. No match, or no `proc` directory at all, is `Ok(false)`. Entries that vanish between listing and
/// reading are skipped, since the process simply exited; any other I/O
/// failure is an [`Error::ProcessTable`].
pub fn process_exists(root_dir: &Path, name: &str) -> Result<bool> {
    let proc_dir = root_dir.join("proc");
    let entries = match fs::read_dir(&proc_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::debug!("{} does not exist, no processes to match", proc_dir.display());
            return Ok(false);
        }
        Err(source) => {
            return Err(Error::ProcessTable {
                path: proc_dir,
                source,
            });
        }
    };

    for entry in entries {
        let entry = entry.map_err(|source| Error::ProcessTable {
            path: proc_dir.clone(),
            source,
        })?;
        if !entry.file_type().is_ok_and(|t| t.is_dir()) {
            continue;
        }

        let cmdline_path = entry.path().join("cmdline");
        let data = match fs::read(&cmdline_path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(source) => {
                return Err(Error::ProcessTable {
                    path: cmdline_path,
                    source,
                });
            }
        };

        let cmdline: Vec<u8> = data
            .into_iter()
            .map(|b| if b == 0 { b' ' } else { b })
            .collect();
        if String::from_utf8_lossy(&cmdline).contains(name) {
            log::debug!("Found {name:?} in {}", cmdline_path.display());
            return Ok(true);
        }
    }

    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add_process(root: &Path, pid: &str, cmdline: &[u8]) {
        let dir = root.join("proc").join(pid);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("cmdline"), cmdline).unwrap();
    }

    #[test]
    fn test_no_match_is_false() {
        let root = tempfile::tempdir().unwrap();
        add_process(root.path(), "1", b"/sbin/init\0");
        add_process(root.path(), "42", b"/usr/bin/dockerd\0-H\0fd://\0");

        assert!(!process_exists(root.path(), "nvidia-persistenced").unwrap());
    }

    #[test]
    fn test_match_anywhere_in_table() {
        let root = tempfile::tempdir().unwrap();
        add_process(root.path(), "1", b"/sbin/init\0");
        add_process(
            root.path(),
            "977",
            b"/var/lib/nvidia/bin/nvidia-persistenced\0--verbose\0",
        );
        add_process(root.path(), "1200", b"bash\0");

        assert!(process_exists(root.path(), "nvidia-persistenced").unwrap());
    }

    #[test]
    fn test_nul_separators_become_spaces() {
        let root = tempfile::tempdir().unwrap();
        add_process(root.path(), "7", b"sleep\0100\0");

        assert!(process_exists(root.path(), "sleep 100").unwrap());
    }

    #[test]
    fn test_entries_without_cmdline_are_skipped() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("proc").join("sys").join("kernel")).unwrap();
        fs::write(root.path().join("proc").join("uptime"), "1.0 2.0").unwrap();
        add_process(root.path(), "3", b"daemon\0");

        assert!(process_exists(root.path(), "daemon").unwrap());
        assert!(!process_exists(root.path(), "other").unwrap());
    }

    #[test]
    fn test_missing_proc_is_no_match() {
        let root = tempfile::tempdir().unwrap();

        assert!(!process_exists(root.path(), "nvidia-persistenced").unwrap());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_proc_that_is_not_a_directory_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("proc"), "not a directory").unwrap();

        let err = process_exists(root.path(), "anything").unwrap_err();
        assert!(matches!(err, Error::ProcessTable { .. }));
        assert!(!err.is_retryable());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_unreadable_cmdline_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("proc").join("5");
        fs::create_dir_all(&dir).unwrap();
        // A directory where the file should be cannot be read as a file
        fs::create_dir(dir.join("cmdline")).unwrap();

        let err = process_exists(root.path(), "anything").unwrap_err();
        match err {
            Error::ProcessTable { path, .. } => assert!(path.ends_with("5/cmdline")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
