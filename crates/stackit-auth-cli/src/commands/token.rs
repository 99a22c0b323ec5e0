use anyhow::Result;
use serde_json::json;
use stackit_auth_core::CredentialResolver;

use crate::output::{OutputFormat, json::print_json};

pub async fn run(
    resolver: &CredentialResolver,
    profile: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let credential = resolver.resolve_credential(profile).await?;

    if format.is_json() {
        return print_json(&json!({
            "access_token": credential.access_token,
            "expires_at": credential.expires_at.map(|t| t.to_rfc3339()),
        }));
    }

    println!("{}", credential.access_token);
    Ok(())
}
