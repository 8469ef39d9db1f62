//! APSpace CLI - authenticated, cached access to the APSpace web services

use clap::Parser;
use env_logger::Env;
use reqwest::Method;

mod cli;
mod output;

use apspace::error::Result;
use cli::{CacheCommands, Cli, Commands, GlobalOptions};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG still wins over the flag when set
    let level = if cli.debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();

    let opts = GlobalOptions::from_cli(&cli);

    match cli.command {
        Commands::Login { username } => cli::login::login(&opts, username).await,
        Commands::Logout => cli::login::logout(&opts).await,
        Commands::Status => cli::status::run(&opts).await,
        Commands::Get {
            endpoint,
            refresh,
            caching,
            request,
        } => cli::request::get(&opts, &endpoint, refresh, caching, &request).await,
        Commands::Post {
            endpoint,
            body,
            request,
        } => cli::request::mutate(&opts, Method::POST, &endpoint, body.as_deref(), &request).await,
        Commands::Put {
            endpoint,
            body,
            request,
        } => cli::request::mutate(&opts, Method::PUT, &endpoint, body.as_deref(), &request).await,
        Commands::Delete { endpoint, request } => {
            cli::request::mutate(&opts, Method::DELETE, &endpoint, None, &request).await
        }
        Commands::Timetable { intake, refresh } => {
            cli::timetable::run(&opts, intake.as_deref(), refresh).await
        }
        Commands::Cache(cache_cmd) => match cache_cmd {
            CacheCommands::Status => cli::cache::status(&opts).await,
            CacheCommands::Clear => cli::cache::clear(&opts).await,
            CacheCommands::Path => cli::cache::path(&opts),
        },
    }
}
