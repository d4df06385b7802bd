//! Step trait for provisioning work
//!
//! A Step is configuration data with three phases. Validation and defaulting
//! never touch the host; only `run` does, and it must be safe to repeat after
//! a crash.

use crate::context::StepContext;
use crate::error::Result;
use std::fmt;

/// Core trait for provisioning steps
///
/// The engine calls, in order and once per pass:
/// 1. [`validate`](Step::validate) - reject missing or malformed required fields
/// 2. [`set_defaults`](Step::set_defaults) - fill optional fields
/// 3. [`run`](Step::run) - make the change
///
/// # Example
///
/// ```ignore
/// use stepflow::{Step, StepContext, Error};
///
/// #[derive(Debug)]
/// struct StopUnit {
///     unit: String,
/// }
///
/// impl Step for StopUnit {
///     fn step_type(&self) -> &'static str {
///         "StopUnit"
///     }
///
///     fn validate(&self) -> stepflow::Result<()> {
///         if self.unit.is_empty() {
///             return Err(Error::invalid_args(self.step_type(), "unit is required"));
///         }
///         Ok(())
///     }
///
///     fn run(&self, ctx: &mut StepContext<'_>) -> anyhow::Result<()> {
///         ctx.systemd().stop(&self.unit)?;
///         Ok(())
///     }
/// }
/// ```
pub trait Step: fmt::Debug {
    /// Step type name as it appears in configuration (e.g. "InstallGPU")
    fn step_type(&self) -> &'static str;

    /// Check required fields. Must not have side effects.
    fn validate(&self) -> Result<()>;

    /// Fill unset optional fields. Must not have side effects.
    fn set_defaults(&mut self) {}

    /// Apply the step to the host
    ///
    /// Everything this does must be idempotent: directories created if
    /// absent, images pulled if needed, daemons started if not running.
    /// There is no rollback; a failed run is retried from the top on the
    /// next pass.
    fn run(&self, ctx: &mut StepContext<'_>) -> anyhow::Result<()>;
}

/// A boxed step for type-erased storage
pub type BoxedStep = Box<dyn Step>;
