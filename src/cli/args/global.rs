//! Global CLI options shared across all commands

use crate::cli::{Cli, OutputFormat};

/// Global flags, resolved once in `main.rs` and handed to every command.
///
/// Precedence is CLI flag > environment variable > config file > default.
/// Only the first two layers live here; the config file is applied in
/// `CommandContext`.
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    /// Output format (pretty, json)
    pub format: OutputFormat,

    /// Custom config file path (defaults to ~/.apspace/config.yaml)
    pub config: Option<String>,

    /// Custom store directory (defaults to the user cache dir)
    pub cache_dir: Option<String>,

    /// Act as a device with no connection
    pub offline: bool,
}

impl GlobalOptions {
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            format: cli.format,
            config: cli.config.clone(),
            cache_dir: cli.cache_dir.clone(),
            offline: cli.offline,
        }
    }

    /// Get config path as `Option<&str>`.
    pub fn config_ref(&self) -> Option<&str> {
        self.config.as_deref()
    }

    /// Get store directory override as `Option<&str>`.
    pub fn cache_dir_ref(&self) -> Option<&str> {
        self.cache_dir.as_deref()
    }
}
