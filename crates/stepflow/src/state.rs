//! Persisted provisioning state
//!
//! The state survives reboots. It records which steps have completed and
//! any working data they left behind, and is only ever written by the
//! engine after a step completes.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

// ============================================================================
// State Structures
// ============================================================================

/// Progress of one provisioning plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    /// Fingerprint of the plan this state belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,

    /// Last time the state was updated
    pub last_updated: DateTime<Utc>,

    /// Per-step working data, keyed `"<index>.<key>"`
    #[serde(default)]
    pub data: BTreeMap<String, String>,

    /// Completed steps, in completion order
    #[serde(default)]
    pub completed: Vec<StepRecord>,
}

/// Completion marker for a single step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub index: usize,
    pub step: String,
    pub completed_at: DateTime<Utc>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            plan: None,
            last_updated: Utc::now(),
            data: BTreeMap::new(),
            completed: Vec::new(),
        }
    }
}

impl State {
    /// Index of the first step that has not completed
    pub fn next_step(&self) -> usize {
        (0..)
            .find(|i| !self.is_complete(*i))
            .unwrap_or(self.completed.len())
    }

    pub fn is_complete(&self, index: usize) -> bool {
        self.completed.iter().any(|r| r.index == index)
    }

    /// Mark a step complete. Marking it again keeps the first record.
    pub fn mark_complete(&mut self, index: usize, step: &str) {
        if !self.is_complete(index) {
            self.completed.push(StepRecord {
                index,
                step: step.to_string(),
                completed_at: Utc::now(),
            });
        }
        self.last_updated = Utc::now();
    }

    pub fn put_data(&mut self, index: usize, key: &str, value: impl Into<String>) {
        self.data.insert(data_key(index, key), value.into());
    }

    pub fn data(&self, index: usize, key: &str) -> Option<&str> {
        self.data.get(&data_key(index, key)).map(String::as_str)
    }

    /// All working data for one step as `(key, value)` pairs
    pub fn step_data(&self, index: usize) -> Vec<(&str, &str)> {
        let prefix = format!("{index}.");
        self.data
            .iter()
            .filter_map(|(k, v)| k.strip_prefix(&prefix).map(|k| (k, v.as_str())))
            .collect()
    }
}

fn data_key(index: usize, key: &str) -> String {
    format!("{index}.{key}")
}

// ============================================================================
// Stores
// ============================================================================

/// Durable home of a [`State`]
pub trait StateStore {
    /// Load the state, or a fresh default if nothing has been saved
    fn load(&self) -> Result<State>;

    /// Persist the state. After a crash, either the previous or the new
    /// state must be readable, never a mix of the two.
    fn save(&mut self, state: &State) -> Result<()>;

    /// Forget all progress
    fn clear(&mut self) -> Result<()>;
}

/// State kept as TOML in a state directory
///
/// Layout: `<dir>/state.toml`, written via `<dir>/state.toml.tmp` and a rename.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    pub const STATE_FILE: &'static str = "state.toml";

    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn state_file(&self) -> PathBuf {
        self.dir.join(Self::STATE_FILE)
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> Result<State> {
        let path = self.state_file();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::debug!("State file does not exist, using default state");
                return Ok(State::default());
            }
            Err(source) => return Err(Error::StateRead { path, source }),
        };

        let state = toml::from_str(&content).map_err(|source| Error::StateParse {
            path: path.clone(),
            source,
        })?;

        log::debug!("Loaded state from {}", path.display());
        Ok(state)
    }

    fn save(&mut self, state: &State) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|source| Error::StateWrite {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.state_file();
        let tmp = path.with_extension("toml.tmp");
        let content = toml::to_string_pretty(state)?;

        write_synced(&tmp, content.as_bytes()).map_err(|source| Error::StateWrite {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| Error::StateWrite {
            path: path.clone(),
            source,
        })?;
        // Make the rename durable
        if let Err(e) = File::open(&self.dir).and_then(|dir| dir.sync_all()) {
            log::warn!("Cannot sync {}: {e}", self.dir.display());
        }

        log::debug!("Saved state to {}", path.display());
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        let path = self.state_file();
        match fs::remove_file(&path) {
            Ok(()) => {
                log::debug!("Removed {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(Error::StateWrite { path, source }),
        }
    }
}

/// Write `bytes` to `path` and flush them to disk before returning
fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// In-memory store for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    state: Option<State>,
    saves: usize,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing state, as if it had been loaded from disk
    pub fn with_state(state: State) -> Self {
        Self {
            state: Some(state),
            saves: 0,
        }
    }

    /// The last saved state
    pub fn saved(&self) -> Option<&State> {
        self.state.as_ref()
    }

    /// How many times `save` has been called
    pub fn save_count(&self) -> usize {
        self.saves
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> Result<State> {
        Ok(self.state.clone().unwrap_or_default())
    }

    fn save(&mut self, state: &State) -> Result<()> {
        self.state = Some(state.clone());
        self.saves += 1;
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.state = None;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
