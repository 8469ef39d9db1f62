//! Login and logout commands

use colored::Colorize;
use dialoguer::{Input, Password, theme::ColorfulTheme};

use apspace::cas::Credentials;
use apspace::config::Config;
use apspace::error::{ApiError, Result};
use apspace::session::DashboardSections;

use crate::cli::{CommandContext, GlobalOptions};
use crate::output::spinner;

/// Non-interactive password source for scripts and tests
const PASSWORD_ENV: &str = "APSPACE_PASSWORD";

/// Run the login command
pub async fn login(opts: &GlobalOptions, username: Option<String>) -> Result<()> {
    let mut config = Config::load_at(opts.config_ref())?;

    let username = match username.or_else(|| config.username.clone()) {
        Some(username) => username,
        None => Input::with_theme(&ColorfulTheme::default())
            .with_prompt("Username")
            .interact_text()?,
    };
    let password = match std::env::var(PASSWORD_ENV) {
        Ok(password) if !password.is_empty() => password,
        _ => Password::with_theme(&ColorfulTheme::default())
            .with_prompt("Password")
            .interact()?,
    };

    let ctx = CommandContext::new(opts).await?;
    if ctx.is_offline() {
        return Err(ApiError::Offline.into());
    }

    let progress = spinner("Logging in...");
    let result = ctx.tickets.login(Credentials::new(username, password)).await;
    progress.finish_and_clear();

    let principal = match result {
        Ok(principal) => principal,
        Err(e @ ApiError::AuthenticationFailure {
            password_must_change: true,
        }) => {
            println!("{} Your password has expired.", "⚠".yellow());
            println!("  → Change it through the APSpace password portal, then log in again");
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };

    config.username = Some(principal.username.clone());
    config.save_at(opts.config_ref())?;

    let endpoints = principal.warm_up_endpoints();
    let progress = spinner("Caching your data for offline use...");
    let stored = ctx.api.warm_cache(endpoints).await;
    progress.finish_and_clear();

    println!("{} Logged in as {}", "✓".green(), principal.username.bold());
    let roles: Vec<String> = principal.roles.iter().map(|r| r.to_string()).collect();
    println!("  Roles: {}", roles.join(", "));
    match principal.default_dashboard() {
        Some(DashboardSections::Students) => println!("  Dashboard: {}", "students".cyan()),
        Some(DashboardSections::Staff) => println!("  Dashboard: {}", "staff".cyan()),
        None => {}
    }
    if !endpoints.is_empty() {
        println!("  Stored for offline use: {}/{}", stored, endpoints.len());
    }

    Ok(())
}

/// Run the logout command
pub async fn logout(opts: &GlobalOptions) -> Result<()> {
    let ctx = CommandContext::new(opts).await?;
    let was_active = ctx.tickets.session().is_active().await;

    ctx.tickets.logout().await?;

    if was_active {
        println!("{} Logged out", "✓".green());
    } else {
        println!("{} No active session; local store cleared", "○".dimmed());
    }
    Ok(())
}
