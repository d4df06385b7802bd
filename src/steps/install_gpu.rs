//! InstallGPU step - install, verify, and activate NVIDIA drivers
//!
//! The driver is built and installed by an installer container; the host
//! only prepares an executable install directory, runs the container, and
//! then checks that the result works.

use anyhow::{Context, Result};
use hostexec::{DockerClient, Invocation, process_exists};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use stepflow::{Step, StepContext};

pub const STEP_TYPE: &str = "InstallGPU";

/// Install directory on the host when none is configured
pub const DEFAULT_INSTALL_DIR: &str = "/var/lib/nvidia";

/// Suffix of an installer archive name used in place of a bare version
const INSTALLER_SUFFIX: &str = ".run";

/// Where the install directory is mounted inside the installer container
const CONTAINER_INSTALL_DIR: &str = "/usr/local/nvidia";

/// Where the host root is mounted inside the installer container
const CONTAINER_ROOT_MOUNT: &str = "/root";

const INSTALLER_LOG: &str = "nvidia-installer.log";
const PERSISTENCE_DAEMON: &str = "nvidia-persistenced";

const GCS_SCHEME: &str = "gs://";
const GCS_BASE_URL: &str = "https://storage.googleapis.com/";

/// Configuration of the InstallGPU step
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InstallGpuStep {
    /// Bare version ("450.51.06") or installer name ("NVIDIA-Linux-x86_64-450.51.06.run")
    #[serde(default)]
    pub nvidia_driver_version: String,

    #[serde(default, rename = "NvidiaDriverMD5Sum")]
    pub nvidia_driver_md5sum: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nvidia_install_dir_host: Option<PathBuf>,

    #[serde(default)]
    pub nvidia_installer_container: String,

    /// `gs://` prefix holding installer artifacts
    #[serde(default, rename = "GCSDepsPrefix", skip_serializing_if = "Option::is_none")]
    pub gcs_deps_prefix: Option<String>,
}

impl InstallGpuStep {
    pub fn new(version: impl Into<String>, installer_container: impl Into<String>) -> Self {
        Self {
            nvidia_driver_version: version.into(),
            nvidia_installer_container: installer_container.into(),
            ..Default::default()
        }
    }

    pub fn install_dir(&self) -> &Path {
        self.nvidia_install_dir_host
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new(DEFAULT_INSTALL_DIR))
    }

    fn bin(&self, name: &str) -> PathBuf {
        self.install_dir().join("bin").join(name)
    }

    /// Base URL for artifact downloads, empty when no prefix is configured
    pub fn download_base_url(&self) -> String {
        match self.gcs_deps_prefix.as_deref() {
            Some(prefix) if !prefix.is_empty() => {
                let bucket_path = prefix.strip_prefix(GCS_SCHEME).unwrap_or(prefix);
                format!("{GCS_BASE_URL}{bucket_path}")
            }
            _ => String::new(),
        }
    }

    /// Direct URL of the installer archive
    ///
    /// Only set when the version names an archive and a prefix is configured.
    pub fn installer_download_url(&self) -> String {
        let base = self.download_base_url();
        if self.nvidia_driver_version.ends_with(INSTALLER_SUFFIX) && !base.is_empty() {
            format!("{base}/{}", self.nvidia_driver_version)
        } else {
            String::new()
        }
    }

    fn setup_install_dir(&self, ctx: &StepContext<'_>) -> Result<()> {
        let dir = self.install_dir();
        let mount = &ctx.deps().mount;

        fs::create_dir_all(dir)
            .with_context(|| format!("error creating {}", dir.display()))?;

        // The backing filesystem may be mounted noexec; the driver binaries must run
        ctx.runner()
            .run(&Invocation::new(mount).arg("--bind").arg(dir).arg(dir))
            .with_context(|| format!("error bind mounting {}", dir.display()))?;
        ctx.runner()
            .run(&Invocation::new(mount).args(["-o", "remount,exec"]).arg(dir))
            .with_context(|| format!("error remounting {} as executable", dir.display()))?;
        Ok(())
    }

    fn installer_env(&self, driver_version: &str) -> Vec<(String, String)> {
        [
            ("NVIDIA_DRIVER_VERSION", driver_version.to_string()),
            ("NVIDIA_DRIVER_MD5SUM", self.nvidia_driver_md5sum.clone()),
            (
                "NVIDIA_INSTALL_DIR_HOST",
                self.install_dir().display().to_string(),
            ),
            (
                "COS_NVIDIA_INSTALLER_CONTAINER",
                self.nvidia_installer_container.clone(),
            ),
            (
                "NVIDIA_INSTALL_DIR_CONTAINER",
                CONTAINER_INSTALL_DIR.to_string(),
            ),
            ("ROOT_MOUNT_DIR", CONTAINER_ROOT_MOUNT.to_string()),
            ("COS_DOWNLOAD_GCS", self.download_base_url()),
            ("GPU_INSTALLER_DOWNLOAD_URL", self.installer_download_url()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    fn installer_args(&self, env: &[(String, String)]) -> Vec<String> {
        let mut args: Vec<String> = ["--rm", "--privileged", "--net=host", "--pid=host"]
            .into_iter()
            .map(String::from)
            .collect();
        for volume in [
            format!("{}:{CONTAINER_INSTALL_DIR}", self.install_dir().display()),
            "/dev:/dev".to_string(),
            format!("/:{CONTAINER_ROOT_MOUNT}"),
        ] {
            args.push("--volume".to_string());
            args.push(volume);
        }
        // Values travel through the environment; only names go on the command line
        for (key, _) in env {
            args.push("-e".to_string());
            args.push(key.clone());
        }
        args.push(self.nvidia_installer_container.clone());
        args
    }

    fn run_installer(&self, docker: &DockerClient<'_>, driver_version: &str) -> Result<()> {
        let env = self.installer_env(driver_version);
        let args = self.installer_args(&env);

        log::info!("Running GPU installer...");
        if let Err(e) = docker.run(&args, &env) {
            log::error!("GPU install failed.");
            self.dump_installer_log();
            return Err(e).context("error running GPU installer");
        }
        log::info!("Done running GPU installer");
        Ok(())
    }

    /// Best-effort copy of the installer's log to stdout
    fn dump_installer_log(&self) {
        let path = self.install_dir().join(INSTALLER_LOG);
        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(e) => {
                log::warn!("Cannot open GPU installer log file {}: {e}", path.display());
                return;
            }
        };

        log::info!("Dumping GPU installer logs to stdout");
        if let Err(e) = io::copy(&mut file, &mut io::stdout().lock()) {
            log::warn!("Cannot dump GPU installer logs: {e}");
        }
    }

    fn ensure_persistence_daemon(&self, ctx: &StepContext<'_>) -> Result<()> {
        let running = process_exists(&ctx.deps().root_dir, PERSISTENCE_DAEMON)
            .with_context(|| format!("error searching for process {PERSISTENCE_DAEMON:?}"))?;

        if running {
            log::info!("{PERSISTENCE_DAEMON} is already running");
            return Ok(());
        }

        log::info!("{PERSISTENCE_DAEMON} is not running: starting {PERSISTENCE_DAEMON}");
        ctx.runner()
            .run(
                &Invocation::new(self.bin(PERSISTENCE_DAEMON))
                    .arg("--verbose")
                    .inherit_output(),
            )
            .with_context(|| format!("error starting {PERSISTENCE_DAEMON}"))?;
        Ok(())
    }
}

/// Bare driver version from either a version or an installer archive name
///
/// `NVIDIA-Linux-x86_64-450.51.06.run` becomes `450.51.06`: the suffix is
/// dropped and the fourth dash-separated field is taken.
pub fn derive_driver_version(version: &str) -> stepflow::Result<String> {
    let Some(stem) = version.strip_suffix(INSTALLER_SUFFIX) else {
        return Ok(version.to_string());
    };

    stem.split('-')
        .filter(|field| !field.is_empty())
        .nth(3)
        .map(str::to_string)
        .ok_or_else(|| {
            stepflow::Error::invalid_args(
                STEP_TYPE,
                format!("malformed nvidia installer {version:?}"),
            )
        })
}

impl Step for InstallGpuStep {
    fn step_type(&self) -> &'static str {
        STEP_TYPE
    }

    fn validate(&self) -> stepflow::Result<()> {
        if self.nvidia_driver_version.is_empty() {
            return Err(stepflow::Error::invalid_args(
                STEP_TYPE,
                "NvidiaDriverVersion is required",
            ));
        }
        if self.nvidia_installer_container.is_empty() {
            return Err(stepflow::Error::invalid_args(
                STEP_TYPE,
                "NvidiaInstallerContainer is required",
            ));
        }
        Ok(())
    }

    fn set_defaults(&mut self) {
        if self.nvidia_install_dir_host.is_none() {
            self.nvidia_install_dir_host = Some(PathBuf::from(DEFAULT_INSTALL_DIR));
        }
    }

    fn run(&self, ctx: &mut StepContext<'_>) -> Result<()> {
        // Derived before any side effect so a bad name changes nothing
        let driver_version = derive_driver_version(&self.nvidia_driver_version)?;
        let docker = ctx.docker();

        log::info!("Installing GPU drivers...");
        self.setup_install_dir(ctx)?;

        docker
            .pull(&[&self.nvidia_installer_container])
            .with_context(|| {
                format!(
                    "error pulling GPU installer {}",
                    self.nvidia_installer_container
                )
            })?;

        self.run_installer(&docker, &driver_version)?;

        let smi = ctx
            .runner()
            .run(&Invocation::new(self.bin("nvidia-smi")))
            .context("nvidia-smi sanity check failed")?;
        log::info!("{}", smi.output.trim_end());

        self.ensure_persistence_daemon(ctx)?;

        let softlockup_panic = ctx
            .deps()
            .root_dir
            .join("proc/sys/kernel/softlockup_panic");
        fs::write(&softlockup_panic, "1")
            .with_context(|| format!("error writing {}", softlockup_panic.display()))?;

        ctx.put_data("driver_version", driver_version);
        ctx.put_data("install_dir", self.install_dir().display().to_string());
        log::info!("Done installing GPU drivers");
        Ok(())
    }
}
