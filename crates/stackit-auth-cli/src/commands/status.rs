use anyhow::Result;
use chrono::Utc;
use serde_json::json;
use stackit_auth_core::CredentialResolver;

use crate::output::{OutputFormat, json::print_json, table::print_details};

pub fn run(
    resolver: &CredentialResolver,
    profile: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let credential = resolver.inspect(profile)?;
    let state = credential.state_at(Utc::now(), resolver.safety_margin());
    let location = credential
        .storage_location
        .map(|l| l.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    if format.is_json() {
        return print_json(&json!({
            "profile": credential.source_profile,
            "email": credential.email,
            "storage_location": credential.storage_location,
            "expires_at": credential.expires_at.map(|t| t.to_rfc3339()),
            "state": state,
            "auth_flow_type": credential.auth_flow_type,
        }));
    }

    let expires = credential
        .expires_at
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "never".to_string());

    print_details(&[
        ("Profile", credential.source_profile.clone()),
        ("Email", credential.email.clone()),
        ("Backend", location),
        ("Expires", expires),
        ("State", state.to_string()),
        ("Access token", credential.masked_access_token()),
    ])
}
