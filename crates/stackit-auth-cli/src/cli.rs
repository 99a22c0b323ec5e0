use crate::output::OutputFormat;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "stackit-auth")]
#[command(
    version,
    about = "stackit-auth - inspect and refresh STACKIT CLI provider credentials"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Profile to use (overrides STACKIT_CLI_PROFILE and the profile file)
    #[arg(long, global = true)]
    pub profile: Option<String>,

    /// Skip the system keyring and only use the credentials file
    #[arg(long, global = true, env = "STACKIT_AUTH_NO_KEYRING")]
    pub no_keyring: bool,

    /// Configuration file (defaults to ~/.config/stackit-auth/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the active profile and where it was selected
    Profile,

    /// Show the stored credential without refreshing it
    Status,

    /// Print a valid access token, refreshing it if needed
    Token,

    /// Refresh the access token now and store the result
    Refresh,

    /// Exit 0 when usable credentials exist, 1 otherwise
    Check,
}
