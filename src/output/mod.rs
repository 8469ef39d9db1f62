//! Output formatting for CLI results

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::cli::OutputFormat;
use apspace::error::Result;

pub mod formatters;
pub mod json;

/// Print a JSON value: enveloped for `--format json`, bare otherwise
pub fn print_value<T: Serialize + ?Sized>(data: &T, format: OutputFormat, offline: bool) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", json::format_json(data, offline)?),
        OutputFormat::Pretty => println!("{}", serde_json::to_string_pretty(data)?),
    }
    Ok(())
}

/// Spinner on stderr while a network call is pending. Hidden when stderr is
/// not a terminal.
pub fn spinner(message: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}
