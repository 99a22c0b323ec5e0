use anyhow::{Context, Result};
use serde_json::json;
use stackit_auth_core::CredentialResolver;

use crate::output::{OutputFormat, json::print_json};

pub async fn run(
    resolver: &CredentialResolver,
    profile: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let credential = resolver
        .force_refresh(profile)
        .await
        .context("Token refresh failed")?;

    if format.is_json() {
        return print_json(&json!({
            "profile": credential.source_profile,
            "storage_location": credential.storage_location,
            "expires_at": credential.expires_at.map(|t| t.to_rfc3339()),
        }));
    }

    let location = credential
        .storage_location
        .map(|l| l.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    match credential.expires_at {
        Some(expires_at) => println!(
            "Refreshed '{}' ({}); expires {}",
            credential.source_profile,
            location,
            expires_at.to_rfc3339()
        ),
        None => println!(
            "Refreshed '{}' ({}); no expiry reported",
            credential.source_profile, location
        ),
    }
    Ok(())
}
