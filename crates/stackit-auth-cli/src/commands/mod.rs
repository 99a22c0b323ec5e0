pub mod check;
pub mod profile;
pub mod refresh;
pub mod status;
pub mod token;

use anyhow::Result;
use stackit_auth_core::{
    AuthEnvironment, CredentialResolver, MemoryKeyring, RefreshConfig, SecretBackend,
    SystemKeyring,
};
use std::process::ExitCode;
use std::sync::Arc;

use crate::cli::{Cli, Commands};
use crate::config::CliConfig;

pub async fn run(cli: Cli, config: CliConfig) -> Result<ExitCode> {
    let resolver = create_resolver(cli.no_keyring, &config.refresh)?;
    let profile_override = config.profile_override(cli.profile.as_deref());

    match cli.command {
        Commands::Profile => {
            profile::run(&resolver, profile_override, cli.format).map(|_| ExitCode::SUCCESS)
        }
        Commands::Status => {
            status::run(&resolver, profile_override, cli.format).map(|_| ExitCode::SUCCESS)
        }
        Commands::Token => token::run(&resolver, profile_override, cli.format)
            .await
            .map(|_| ExitCode::SUCCESS),
        Commands::Refresh => refresh::run(&resolver, profile_override, cli.format)
            .await
            .map(|_| ExitCode::SUCCESS),
        Commands::Check => check::run(&resolver, profile_override, cli.format).await,
    }
}

fn create_resolver(no_keyring: bool, refresh: &RefreshConfig) -> Result<CredentialResolver> {
    let environment = AuthEnvironment::from_env()?;
    let secrets: Arc<dyn SecretBackend> = if no_keyring {
        Arc::new(MemoryKeyring::new())
    } else {
        Arc::new(SystemKeyring::new())
    };
    Ok(CredentialResolver::with_config(
        environment,
        secrets,
        refresh,
    )?)
}
