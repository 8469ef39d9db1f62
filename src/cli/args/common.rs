//! Common CLI types shared across commands

use std::time::Duration;

use clap::Args;

use apspace::client::RequestOptions;

/// Output format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Pretty format - human-optimized rich formatting
    #[default]
    Pretty,
    /// JSON format - structured for scripts, wrapped with metadata
    Json,
}

/// Request shaping flags shared by the HTTP verb commands
#[derive(Debug, Clone, Args, Default)]
pub struct RequestArgs {
    /// Query parameter as key=value (repeatable)
    #[arg(long = "param", short = 'p', value_parser = parse_key_val)]
    pub params: Vec<(String, String)>,

    /// Base URL override for this request
    #[arg(long)]
    pub url: Option<String>,

    /// Send without a service ticket (public endpoints)
    #[arg(long)]
    pub no_auth: bool,

    /// Per-attempt timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,
}

impl RequestArgs {
    pub fn options(&self) -> RequestOptions {
        let mut options = RequestOptions::new();
        for (name, value) in &self.params {
            options = options.param(name, value);
        }
        if let Some(url) = &self.url {
            options = options.url(url.trim_end_matches('/'));
        }
        if self.no_auth {
            options = options.unauthenticated();
        }
        if let Some(secs) = self.timeout {
            options = options.timeout(Duration::from_secs(secs));
        }
        options
    }
}

/// Parse a `key=value` pair
pub fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid key=value: no '=' found in '{}'", s))?;
    if key.is_empty() {
        return Err(format!("invalid key=value: empty key in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}
