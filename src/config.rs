use crate::steps::StepConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use stepflow::BoxedStep;

// ============================================================================
// Provisioning Config
// ============================================================================

/// Ordered list of steps for one provisioning pass
///
/// ```json
/// {"Steps": [{"Type": "InstallGPU", "Args": {"NvidiaDriverVersion": "450.51.06", ...}}]}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProvisionConfig {
    #[serde(default)]
    pub steps: Vec<StepConfig>,
}

impl ProvisionConfig {
    /// Load a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        Self::from_json(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Write the config as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Could not create {}", dir.display()))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).with_context(|| format!("Could not write {}", path.display()))?;
        Ok(())
    }

    /// Stable hash of the step list, hex encoded
    ///
    /// Two configs with the same steps and arguments in the same order share
    /// a fingerprint regardless of whitespace in the source file.
    pub fn fingerprint(&self) -> Result<String> {
        let canonical = serde_json::to_vec(&self.steps)?;
        Ok(blake3::hash(&canonical).to_hex().to_string())
    }

    pub fn into_steps(self) -> Vec<BoxedStep> {
        self.steps.into_iter().map(StepConfig::into_step).collect()
    }
}
