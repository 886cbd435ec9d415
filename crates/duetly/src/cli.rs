//! Clap derive structures for the `duetly` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// duetly -- command-line client for Duet controllers
#[derive(Debug, Parser)]
#[command(
    name = "duetly",
    version,
    about = "Control Duet 3D printers and CNC machines from the command line",
    long_about = "Talks to RepRapFirmware boards directly over HTTP, or to a \
        board computer running DuetSoftwareFramework over REST and WebSocket.\n\n\
        The protocol is detected automatically unless --protocol is given.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Controller profile to use
    #[arg(long, short = 'p', env = "DUETLY_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Controller host or URL (overrides profile)
    #[arg(long, short = 'H', env = "DUETLY_HOST", global = true)]
    pub host: Option<String>,

    /// Board password
    #[arg(long, env = "DUETLY_PASSWORD", global = true, hide_env_values = true)]
    pub password: Option<String>,

    /// Wire protocol
    #[arg(long, env = "DUETLY_PROTOCOL", global = true)]
    pub protocol: Option<ProtocolArg>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "DUETLY_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "DUETLY_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in milliseconds
    #[arg(long, env = "DUETLY_TIMEOUT_MS", global = true)]
    pub timeout_ms: Option<u64>,
}

// ── Value Enums ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ProtocolArg {
    /// Try standalone first, fall back to the board computer
    Auto,
    /// Standalone firmware (rr_* endpoints)
    Poll,
    /// Board computer REST service
    Rest,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show machine status, temperatures and job progress
    #[command(alias = "st")]
    Status,

    /// Stream connector events until interrupted
    Watch(WatchArgs),

    /// Send G/M/T-code and print the reply
    #[command(alias = "gcode")]
    Send(SendArgs),

    /// Upload local files to the controller
    #[command(alias = "put")]
    Upload(UploadArgs),

    /// Download files from the controller
    #[command(alias = "get")]
    Download(DownloadArgs),

    /// List a directory
    Ls(LsArgs),

    /// Show G-code file information
    Info(InfoArgs),

    /// Delete a file or empty directory
    Rm(RmArgs),

    /// Move or rename a file
    Mv(MvArgs),

    /// Create a directory
    Mkdir(MkdirArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Command Arguments ────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Print full model snapshots instead of changed section names
    #[arg(long)]
    pub model: bool,
}

#[derive(Debug, Args)]
pub struct SendArgs {
    /// Code text, e.g. "G28" or "M104 S200"
    #[arg(required = true)]
    pub code: Vec<String>,

    /// Return as soon as the code is queued
    #[arg(long)]
    pub no_wait: bool,
}

#[derive(Debug, Args)]
pub struct UploadArgs {
    /// Local files to upload
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Destination directory on the controller
    #[arg(long, short = 'd', default_value = "0:/gcodes")]
    pub dest: String,
}

#[derive(Debug, Args)]
pub struct DownloadArgs {
    /// Controller paths, e.g. "0:/sys/config.g"
    #[arg(required = true)]
    pub paths: Vec<String>,

    /// Local directory to write into
    #[arg(long, short = 'd', default_value = ".")]
    pub dest: PathBuf,
}

#[derive(Debug, Args)]
pub struct LsArgs {
    /// Directory to list
    #[arg(default_value = "0:/gcodes")]
    pub dir: String,
}

#[derive(Debug, Args)]
pub struct InfoArgs {
    /// G-code file path
    pub path: String,
}

#[derive(Debug, Args)]
pub struct RmArgs {
    /// Path to delete
    pub path: String,
}

#[derive(Debug, Args)]
pub struct MvArgs {
    /// Source path
    pub from: String,

    /// Destination path
    pub to: String,

    /// Replace an existing destination
    #[arg(long, short = 'f')]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct MkdirArgs {
    /// Directory to create
    pub path: String,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create initial config file with guided setup
    Init,

    /// Display current configuration (passwords masked)
    Show,

    /// Set a profile value
    Set {
        /// Key, e.g. "host", "protocol", "timeout_ms"
        key: String,

        /// Value to set
        value: String,
    },

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },

    /// Store the board password in the system keyring
    SetPassword {
        /// Profile to store the password for (defaults to the active one)
        #[arg(long)]
        profile: Option<String>,
    },
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
