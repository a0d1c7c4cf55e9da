//! Clap derive structures for the `fleetkey` CLI.
//!
//! Defines the command tree, global flags, and the value enums shared by
//! the handlers. Kept free of workspace crates so `build.rs` can render
//! man pages from it.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// fleetkey -- credential lifecycle for ESPHome device fleets
#[derive(Debug, Parser)]
#[command(
    name = "fleetkey",
    version,
    about = "Rotate and audit the credentials baked into ESPHome firmware",
    long_about = "Generates, validates, and rotates the API key, OTA password, and\n\
        fallback hotspot password shared by a fleet of ESPHome devices.\n\n\
        Rotation runs in two stages so devices still holding the previous OTA\n\
        password can be reflashed without losing access.",
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
    /// Working tree holding the device configurations
    #[arg(long = "dir", short = 'C', default_value = ".", global = true)]
    pub dir: PathBuf,

    /// Project config file (default: <dir>/fleetkey.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'o', default_value = "table", global = true)]
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
}

// ── Output & Color Enums ─────────────────────────────────────────────

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
    /// Rotate every device credential in two stages
    Rotate(RotateArgs),

    /// Create, inspect, and restore backups of the secrets and config files
    #[command(alias = "bk")]
    Backup(BackupArgs),

    /// Validate the secrets file, vault integration, and tracked files
    ValidateSecrets(ValidateSecretsArgs),

    /// Inspect and maintain the rotation history
    #[command(alias = "track")]
    TrackRotation(TrackRotationArgs),

    /// Deploy the current secrets to one device or the whole fleet
    Deploy(DeployArgs),

    /// List discovered devices and their configuration variants
    #[command(alias = "dev")]
    Devices,

    /// Print a freshly generated credential
    #[command(alias = "gen")]
    Generate(GenerateArgs),

    /// Scan files for exposed or hardcoded credentials
    Scan(ScanArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Shared value enums ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CredentialArg {
    /// Native API encryption key (base64, 44 characters)
    ApiKey,
    /// OTA update password (hex, 32 characters)
    OtaPassword,
    /// Fallback hotspot password (alphanumeric, 12 characters)
    FallbackPassword,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum RotationTypeArg {
    Scheduled,
    Emergency,
    Manual,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum MethodArg {
    Manual,
    Automated,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum MarkStatus {
    Passed,
    Failed,
}

// ── Rotate ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct RotateArgs {
    /// Kind of rotation to record
    #[arg(long = "type", value_enum, default_value = "scheduled")]
    pub rotation_type: RotationTypeArg,

    /// Why the rotation happens
    #[arg(long, default_value = "scheduled_rotation")]
    pub reason: String,

    /// Free-form notes stored with the history entry
    #[arg(long)]
    pub notes: Option<String>,

    /// Re-run stage 2, verification and recording after an interrupted rotation
    #[arg(long)]
    pub resume: bool,
}

// ── Backup ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct BackupArgs {
    #[command(subcommand)]
    pub command: BackupCommand,
}

#[derive(Debug, Subcommand)]
pub enum BackupCommand {
    /// Back up the secrets file and tracked configuration
    Create {
        /// Label embedded in the backup id
        label: Option<String>,
    },

    /// List backups, newest first
    #[command(alias = "ls")]
    List,

    /// Re-hash a backup and report mismatches
    Verify {
        /// Backup id
        id: String,
    },

    /// Copy a backup's files back into the working tree
    Restore {
        /// Backup id
        id: String,

        /// Overwrite files that already exist
        #[arg(long)]
        force: bool,
    },

    /// Remove all but the newest backups
    Cleanup {
        /// Number of backups to keep (default: backup.keep from config)
        #[arg(long)]
        keep: Option<usize>,
    },
}

// ── Validate ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ValidateSecretsArgs {
    /// Tolerate previous credentials while a rotation is in progress
    #[arg(long)]
    pub transition: bool,
}

// ── Track rotation ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct TrackRotationArgs {
    #[command(subcommand)]
    pub command: TrackCommand,
}

#[derive(Debug, Subcommand)]
pub enum TrackCommand {
    /// Due check, credential validation, and statistics
    Check {
        /// Maximum credential age before a rotation is due
        #[arg(long)]
        max_age_days: Option<i64>,
    },

    /// Show rotation statistics
    Stats,

    /// Write the markdown rotation report
    Report,

    /// Validate the credentials currently held by the vault
    Validate,

    /// Report whether a rotation is due
    Due {
        /// Maximum credential age before a rotation is due
        #[arg(long)]
        max_age_days: Option<i64>,
    },

    /// Record a rotation performed outside fleetkey
    Add {
        /// Kind of rotation
        #[arg(long = "type", value_enum)]
        rotation_type: Option<RotationTypeArg>,

        /// Why the rotation happened
        #[arg(long)]
        reason: Option<String>,

        /// Credentials rotated (default: all)
        #[arg(long, value_enum, value_delimiter = ',')]
        credentials: Vec<CredentialArg>,

        /// How the rotation was performed
        #[arg(long, value_enum, default_value = "manual")]
        method: MethodArg,

        /// Free-form notes
        #[arg(long)]
        notes: Option<String>,
    },

    /// Set the validation outcome of the most recent rotation
    Mark {
        /// Outcome to record
        #[arg(value_enum)]
        status: MarkStatus,

        /// Notes stored with the outcome
        #[arg(long)]
        notes: Option<String>,
    },
}

// ── Deploy ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
#[command(group(clap::ArgGroup::new("target").required(true).args(["device", "all"])))]
pub struct DeployArgs {
    /// Device name (configuration file stem)
    pub device: Option<String>,

    /// Deploy every discovered device
    #[arg(long)]
    pub all: bool,
}

// ── Generate / Scan ──────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GenerateArgs {
    /// Credential kind to generate
    #[arg(value_enum)]
    pub kind: CredentialArg,
}

#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Files to scan (default: the whole working tree)
    pub files: Vec<PathBuf>,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration
    Show,

    /// Print the configuration files consulted
    Path,

    /// Write a default fleetkey.toml into the working tree
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
