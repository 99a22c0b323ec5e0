use colored::Colorize;
use stackit_auth_core::AuthError;
use stackit_auth_core::error::LOGIN_COMMAND;

pub fn handle_error(err: anyhow::Error) -> ! {
    eprintln!("{} {:#}", "Error:".red().bold(), err);

    let auth_error = err.chain().find_map(|e| e.downcast_ref::<AuthError>());

    if auth_error.is_some_and(AuthError::requires_login) {
        eprintln!("\n{}", "Suggestion:".yellow().bold());
        eprintln!("  Log in again with:");
        eprintln!("  {} {}", "$".dimmed(), LOGIN_COMMAND);
    }

    if matches!(auth_error, Some(AuthError::RefreshTransport(_))) {
        eprintln!("\n{}", "Suggestion:".yellow().bold());
        eprintln!("  Check your internet connection and try again.");
    }

    if matches!(auth_error, Some(AuthError::Persist { .. })) {
        eprintln!("\n{}", "Suggestion:".yellow().bold());
        eprintln!("  Check that ~/.stackit is writable or unlock the system keyring.");
    }

    std::process::exit(1);
}
