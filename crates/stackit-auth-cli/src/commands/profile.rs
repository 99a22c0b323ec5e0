use anyhow::Result;
use stackit_auth_core::CredentialResolver;

use crate::output::{OutputFormat, json::print_json};

pub fn run(resolver: &CredentialResolver, profile: Option<&str>, format: OutputFormat) -> Result<()> {
    let resolved = resolver.resolve_profile(profile)?;

    if format.is_json() {
        return print_json(&resolved);
    }

    println!("{} ({})", resolved.name, resolved.source);
    Ok(())
}
