//! CLI command definitions and handlers

use clap::{Parser, Subcommand};

use apspace::client::CachingStrategy;

pub mod args;
pub mod cache;
pub mod context;
pub mod login;
pub mod request;
pub mod status;
pub mod timetable;

pub use args::{GlobalOptions, OutputFormat, RequestArgs};
pub use context::CommandContext;

/// APSpace CLI - authenticated, cached access to the APSpace web services
#[derive(Parser, Debug)]
#[command(name = "apspace")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (pretty, json)
    #[arg(
        long,
        global = true,
        env = "APSPACE_FORMAT",
        default_value = "pretty",
        hide_env = true,
        hide_possible_values = true
    )]
    pub format: OutputFormat,

    /// Override config file location
    #[arg(long, global = true, env = "APSPACE_CONFIG", hide_env = true)]
    pub config: Option<String>,

    /// Override local store location
    #[arg(long, global = true, env = "APSPACE_CACHE_DIR", hide_env = true)]
    pub cache_dir: Option<String>,

    /// Enable debug logging
    #[arg(long, global = true, env = "APSPACE_DEBUG", hide_env = true)]
    pub debug: bool,

    /// Act as a device with no connection: GETs are served from the local store
    #[arg(long, global = true, env = "APSPACE_OFFLINE", hide_env = true)]
    pub offline: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Log in with your APSpace credentials
    Login {
        /// Username (defaults to the last user to log in)
        #[arg(long, short)]
        username: Option<String>,
    },

    /// Log out and clear the local store
    Logout,

    /// Show configuration, session and connectivity status
    Status,

    /// GET an endpoint through the cached request pipeline
    Get {
        /// Endpoint path, e.g. /student/profile
        endpoint: String,

        /// Skip cached shortcuts and go to the network
        #[arg(long)]
        refresh: bool,

        /// Caching strategy (cache-only, network-with-cache-fallback,
        /// cache-update-refresh)
        #[arg(long)]
        caching: Option<CachingStrategy>,

        #[command(flatten)]
        request: RequestArgs,
    },

    /// POST a JSON body to an endpoint
    Post {
        endpoint: String,

        /// JSON request body
        #[arg(long)]
        body: Option<String>,

        #[command(flatten)]
        request: RequestArgs,
    },

    /// PUT a JSON body to an endpoint
    Put {
        endpoint: String,

        /// JSON request body
        #[arg(long)]
        body: Option<String>,

        #[command(flatten)]
        request: RequestArgs,
    },

    /// DELETE an endpoint
    Delete {
        endpoint: String,

        #[command(flatten)]
        request: RequestArgs,
    },

    /// Show this week's class timetable
    Timetable {
        /// Only classes for this intake code
        #[arg(long)]
        intake: Option<String>,

        /// Force a fresh download of the feed
        #[arg(long)]
        refresh: bool,
    },

    /// Manage the local store
    #[command(subcommand)]
    Cache(CacheCommands),
}

/// Local store subcommands
#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Show store statistics
    Status,

    /// Remove every stored entry, including the session
    Clear,

    /// Print the store location
    Path,
}
