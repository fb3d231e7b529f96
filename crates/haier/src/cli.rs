//! Clap derive structures for the `haier` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// haier -- command-line client for Haier U+ smart-home devices
#[derive(Debug, Parser)]
#[command(
    name = "haier",
    version,
    about = "Control Haier U+ smart-home devices from the command line",
    long_about = "Talks to the Haier U+ cloud: lists families and devices, reads\n\
        device digital models, sends commands and streams live updates.\n\n\
        Commands prefer the live channel and fall back to the REST API.",
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
    /// Account profile to use
    #[arg(long, short = 'p', env = "HAIER_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Directory for the token, client id and model cache (overrides profile)
    #[arg(long, env = "HAIER_STORAGE_DIR", global = true)]
    pub storage_dir: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "HAIER_OUTPUT",
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
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
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

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
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
    /// Log in and store the access token
    Login,

    /// List the families (homes) on the account
    #[command(alias = "fam")]
    Families,

    /// List the devices bound to a family
    #[command(alias = "dev")]
    Devices(DevicesArgs),

    /// Show a device's digital model
    Model(ModelArgs),

    /// Send attribute values to a device
    Send(SendArgs),

    /// Stream live model updates until interrupted
    Watch(WatchArgs),

    /// Manage the configuration file
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Device commands ──────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DevicesArgs {
    /// Family id (see `haier families`)
    pub family_id: String,
}

#[derive(Debug, Args)]
pub struct ModelArgs {
    /// Device id
    pub device_id: String,

    /// Bypass the local cache and fetch from the cloud
    #[arg(long, short = 'r')]
    pub refresh: bool,
}

#[derive(Debug, Args)]
pub struct SendArgs {
    /// Device id
    pub device_id: String,

    /// Attribute assignments, e.g. `targetTemperature=24`
    #[arg(required = true, value_name = "NAME=VALUE")]
    pub assignments: Vec<String>,

    /// Open the live channel first instead of going straight to REST
    #[arg(long)]
    pub live: bool,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Device ids to subscribe to
    #[arg(required = true)]
    pub device_ids: Vec<String>,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,

    /// Display the resolved configuration (passwords redacted)
    Show,

    /// Create or replace a profile
    Init(InitArgs),
}

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Profile name
    #[arg(long, default_value = "default")]
    pub name: String,

    /// Account username (phone number or email)
    #[arg(long)]
    pub username: String,

    /// Read the password from this environment variable at run time
    #[arg(long)]
    pub password_env: Option<String>,

    /// Storage directory for this profile
    #[arg(long)]
    pub storage_dir: Option<PathBuf>,

    /// Overwrite an existing profile of the same name
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
