//! StopServices step - stop systemd units before later steps run

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use stepflow::{Step, StepContext};

pub const STEP_TYPE: &str = "StopServices";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StopServicesStep {
    /// Units to stop, in order
    #[serde(default)]
    pub units: Vec<String>,
}

impl Step for StopServicesStep {
    fn step_type(&self) -> &'static str {
        STEP_TYPE
    }

    fn validate(&self) -> stepflow::Result<()> {
        if self.units.is_empty() {
            return Err(stepflow::Error::invalid_args(
                STEP_TYPE,
                "Units must name at least one unit",
            ));
        }
        if self.units.iter().any(|u| u.trim().is_empty()) {
            return Err(stepflow::Error::invalid_args(
                STEP_TYPE,
                "Units must not contain empty names",
            ));
        }
        Ok(())
    }

    fn run(&self, ctx: &mut StepContext<'_>) -> Result<()> {
        let systemd = ctx.systemd();
        for unit in &self.units {
            systemd
                .stop(unit)
                .with_context(|| format!("error stopping {unit}"))?;
        }
        Ok(())
    }
}
