use crate::paths::{DEFAULT_STATE_DIR, ENV_STATE_DIR};
use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "provisioner")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Provision a running instance through ordered, reboot-resilient steps", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Directory holding provisioning state
    #[arg(long, global = true, env = ENV_STATE_DIR, default_value = DEFAULT_STATE_DIR)]
    pub state_dir: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start (or continue) a provisioning pass from a config file
    Run(RunArgs),

    /// Continue the pass recorded in the state directory
    Resume(DepsArgs),

    /// Show which steps have completed
    Status,

    /// Forget all progress so the next pass starts from the first step
    Reset,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Provisioning config (JSON)
    #[arg(short, long)]
    pub config: PathBuf,

    #[command(flatten)]
    pub deps: DepsArgs,
}

/// Overrides for the external tools steps drive
///
/// Unset tools are looked up in PATH, then at their usual location.
#[derive(Debug, Clone, Default, Args)]
pub struct DepsArgs {
    /// Path to docker
    #[arg(long, env = "PROVISIONER_DOCKER")]
    pub docker: Option<PathBuf>,

    /// Path to journalctl
    #[arg(long, env = "PROVISIONER_JOURNALCTL")]
    pub journalctl: Option<PathBuf>,

    /// Path to mount
    #[arg(long, env = "PROVISIONER_MOUNT")]
    pub mount: Option<PathBuf>,

    /// Path to systemctl
    #[arg(long, env = "PROVISIONER_SYSTEMCTL")]
    pub systemctl: Option<PathBuf>,

    /// Root of the filesystem being provisioned
    #[arg(long, env = "PROVISIONER_ROOT_DIR", default_value = "/")]
    pub root_dir: PathBuf,
}
