//! Status command implementation

use colored::Colorize;
use serde_json::json;

use apspace::config::Config;
use apspace::error::Result;

use crate::cli::{CommandContext, GlobalOptions, OutputFormat};
use crate::output::formatters::format_size;
use crate::output::print_value;

/// Run the status command to display configuration and session status
pub async fn run(opts: &GlobalOptions) -> Result<()> {
    let config_path = Config::resolve_path(opts.config_ref())?;
    let ctx = CommandContext::new(opts).await?;
    let principal = ctx.tickets.session().principal().await;
    let stats = ctx.store.stats().await?;
    let settings = ctx.api.settings();

    if ctx.format == OutputFormat::Json {
        let status = json!({
            "config_path": config_path.display().to_string(),
            "config_exists": config_path.exists(),
            "username": ctx.config.username,
            "session": principal.as_ref().map(|p| json!({
                "username": p.username,
                "roles": p.roles,
            })),
            "runtime": ctx.api.network().runtime(),
            "online": !ctx.is_offline(),
            "cas_url": ctx.config.cas_url,
            "api_url": settings.api_url,
            "caching": settings.caching,
            "retry": settings.retry,
            "store": {
                "path": ctx.store.path().display().to_string(),
                "entries": stats.total_entries,
                "size_bytes": stats.total_size_bytes,
            },
        });
        return print_value(&status, ctx.format, ctx.is_offline());
    }

    println!("{}\n", "APSpace Status".bold());

    if config_path.exists() {
        println!("Config file: {}", config_path.display().to_string().cyan());
    } else {
        println!(
            "Config file: {} {}",
            config_path.display().to_string().cyan(),
            "(not created yet, using defaults)".dimmed()
        );
    }
    println!();

    match &principal {
        Some(principal) => {
            let roles: Vec<String> = principal.roles.iter().map(|r| r.to_string()).collect();
            println!(
                "{} Logged in as {} ({})",
                "✓".green(),
                principal.username.bold(),
                roles.join(", ")
            );
        }
        None => {
            println!("{} Not logged in", "✗".red());
            println!("  → Run 'apspace login' to sign in");
        }
    }

    if ctx.is_offline() {
        println!("{} Offline: requests are served from the local store", "⚠".yellow());
    } else {
        println!("{} Online ({:?} runtime)", "✓".green(), ctx.api.network().runtime());
    }

    println!("{} CAS server: {}", "○".dimmed(), ctx.config.cas_url);
    println!("{} API server: {}", "○".dimmed(), settings.api_url);
    println!("{} Default caching: {}", "○".dimmed(), settings.caching);
    let delays: Vec<String> = settings
        .retry
        .delays()
        .map(|d| format!("{}s", d.as_secs_f64()))
        .collect();
    println!(
        "{} Retries: {} ({})",
        "○".dimmed(),
        settings.retry.max_retries,
        if delays.is_empty() { "none".to_string() } else { delays.join(", ") }
    );
    println!(
        "{} Local store: {} entries, {} ({})",
        "○".dimmed(),
        stats.total_entries,
        format_size(stats.total_size_bytes),
        ctx.store.path().display()
    );
    println!();

    Ok(())
}
