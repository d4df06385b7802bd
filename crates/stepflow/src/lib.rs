//! # Stepflow
//!
//! Ordered, reboot-resilient provisioning steps.
//!
//! A provisioning pass is a list of steps run one at a time. Progress is
//! written back after every completed step, so a machine that restarts in
//! the middle of a pass picks up at the first incomplete step instead of
//! starting over.
//!
//! ## Core Concepts
//!
//! - **Step**: configuration data plus three phases: `validate` (pure),
//!   `set_defaults` (pure), and `run` (side effects, must be idempotent)
//! - **Deps**: resolved paths of the external tools and the root directory
//! - **State**: the persisted record of completed steps and per-step data
//! - **StateStore**: where the state lives (a directory on disk, or memory)
//! - **execute**: the engine that ties them together
//!
//! ## Example
//!
//! ```ignore
//! use stepflow::{Deps, ExecuteOptions, FileStateStore, Step, StepContext, execute_simple};
//!
//! #[derive(Debug)]
//! struct Touch { path: std::path::PathBuf }
//!
//! impl Step for Touch {
//!     fn step_type(&self) -> &'static str { "Touch" }
//!     fn validate(&self) -> stepflow::Result<()> { Ok(()) }
//!     fn run(&self, _ctx: &mut StepContext<'_>) -> anyhow::Result<()> {
//!         std::fs::write(&self.path, b"")?;
//!         Ok(())
//!     }
//! }
//!
//! let mut steps: Vec<Box<dyn Step>> = vec![Box::new(Touch { path: "/tmp/x".into() })];
//! let mut store = FileStateStore::new("/var/lib/provisioner");
//! let summary = execute_simple(&mut steps, &Deps::default(), &hostexec::SystemRunner, &mut store)?;
//! ```

pub mod context;
pub mod deps;
pub mod engine;
pub mod error;
pub mod state;
pub mod step;

// Re-export main types at crate root
pub use context::{LogProgress, NoProgress, ProgressCallback, StepContext};
pub use deps::Deps;
pub use engine::{ExecuteOptions, RunSummary, execute, execute_simple};
pub use error::{Error, Result};
pub use state::{FileStateStore, MemoryStateStore, State, StateStore, StepRecord};
pub use step::{BoxedStep, Step};
