//! Clap derive structures for the `edd` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// edd -- drive EDD server products over KATCP
#[derive(Debug, Parser)]
#[command(
    name = "edd",
    version,
    about = "Control EDD server products from the command line",
    long_about = "Control EDD server products over KATCP.\n\n\
        Connects to the KATCP server of one product and forwards\n\
        configure, deconfigure, capture-start and capture-stop requests.\n\n\
        Products are looked up by id in the config file, or addressed\n\
        directly with --host and --port.",
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
    /// Product id
    #[arg(long, short = 'p', env = "EDD_PRODUCT", global = true)]
    pub product: Option<String>,

    /// Product server host (overrides the config file)
    #[arg(long, short = 'H', env = "EDD_HOST", global = true)]
    pub host: Option<String>,

    /// Product server port
    #[arg(long, short = 'P', env = "EDD_PORT", global = true)]
    pub port: Option<String>,

    /// Config file path
    #[arg(long, env = "EDD_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "EDD_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// Seconds to wait for the server connection (0 waits forever)
    #[arg(long, env = "EDD_SYNC_TIMEOUT", global = true)]
    pub sync_timeout: Option<u64>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Send a JSON configuration to the product
    Configure(ConfigureArgs),

    /// Deconfigure the product and release it
    Deconfigure,

    /// Start data capture
    CaptureStart,

    /// Stop data capture
    CaptureStop,

    /// Install the product's sensors and list them
    Sensors,

    /// List products in the config file
    #[command(alias = "ls")]
    Products,

    /// Inspect the configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct ConfigureArgs {
    /// JSON file with the configuration, or `-` for stdin
    pub file: PathBuf,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration as TOML
    Show,
    /// Print the config file path
    Path,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Target shell
    pub shell: clap_complete::Shell,
}
