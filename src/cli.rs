use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "nodestrap")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Idempotent installer for Kubernetes node components", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Component configuration file [default: /etc/nodestrap/components.toml]
    #[arg(long, global = true, env = "NODESTRAP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Prefix log lines with timestamps
    #[arg(long, global = true)]
    pub log_timestamps: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Configuration file in effect, and whether it was named explicitly
    /// (flag or environment), in which case it must exist.
    pub fn config_path(&self) -> (PathBuf, bool) {
        match &self.config {
            Some(path) => (path.clone(), true),
            None => (PathBuf::from(crate::config::DEFAULT_CONFIG_PATH), false),
        }
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Install components whose installed version differs from the target
    Install(InstallArgs),

    /// Show installed vs target versions without installing
    Status(StatusArgs),

    /// List the effective component table
    List,

    /// Render a one-shot systemd unit for a component
    Unit(UnitArgs),

    /// Manage the configuration file
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl Command {
    /// Whether the command checks the cancel token. Only these route
    /// SIGINT/SIGTERM to it; the others keep the default disposition so a
    /// single Ctrl-C stops them.
    pub fn observes_cancellation(&self) -> bool {
        matches!(self, Self::Install(args) if !args.dry_run)
    }
}

// ============================================================================
// Install
// ============================================================================

#[derive(Args)]
pub struct InstallArgs {
    /// Components to install (default: every enabled component)
    pub components: Vec<String>,

    /// Target architecture (amd64, arm64, ...); detected when omitted
    #[arg(long)]
    pub arch: Option<String>,

    /// Number of components installed in parallel
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Parent directory for per-run scratch directories
    #[arg(long)]
    pub scratch_dir: Option<PathBuf>,

    /// Probe and report what would be installed without downloading
    #[arg(long)]
    pub dry_run: bool,
}

// ============================================================================
// Status
// ============================================================================

#[derive(Args)]
pub struct StatusArgs {
    /// Components to check (default: every enabled component)
    pub components: Vec<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// ============================================================================
// Unit
// ============================================================================

#[derive(Args)]
pub struct UnitArgs {
    /// Component the unit installs
    pub component: String,

    /// Write nodestrap-<component>.service into this directory instead of
    /// printing it
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Path of the nodestrap executable used in ExecStart (default: this
    /// executable)
    #[arg(long)]
    pub exe: Option<PathBuf>,
}

// ============================================================================
// Config
// ============================================================================

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Print the effective component table as TOML
    Show,

    /// Write the built-in component table to the config path
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Validate every component specification
    Validate,

    /// Print the config file path
    Path,
}
