use anyhow::Result;
use serde_json::json;
use stackit_auth_core::CredentialResolver;
use std::process::ExitCode;

use crate::output::{OutputFormat, json::print_json};

pub async fn run(
    resolver: &CredentialResolver,
    profile: Option<&str>,
    format: OutputFormat,
) -> Result<ExitCode> {
    let authenticated = resolver.is_authenticated(profile).await;

    if format.is_json() {
        print_json(&json!({ "authenticated": authenticated }))?;
    } else if authenticated {
        println!("authenticated");
    } else {
        println!("not authenticated");
    }

    Ok(if authenticated {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
