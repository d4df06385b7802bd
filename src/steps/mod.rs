//! Provisioning step types
//!
//! Each variant of [`StepConfig`] is one `{"Type": ..., "Args": {...}}` entry
//! of a provisioning config.

pub mod install_gpu;
pub mod stop_services;

pub use install_gpu::InstallGpuStep;
pub use stop_services::StopServicesStep;

use serde::{Deserialize, Serialize};
use stepflow::BoxedStep;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "Type", content = "Args")]
pub enum StepConfig {
    #[serde(rename = "InstallGPU")]
    InstallGpu(InstallGpuStep),

    StopServices(StopServicesStep),
}

impl StepConfig {
    pub fn step_type(&self) -> &'static str {
        match self {
            Self::InstallGpu(_) => install_gpu::STEP_TYPE,
            Self::StopServices(_) => stop_services::STEP_TYPE,
        }
    }

    pub fn into_step(self) -> BoxedStep {
        match self {
            Self::InstallGpu(step) => Box::new(step),
            Self::StopServices(step) => Box::new(step),
        }
    }
}
