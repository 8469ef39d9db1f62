//! Local store management commands

use apspace::cache::{KeyValueStore, SqliteStore};
use apspace::error::Result;

use crate::cli::context::{open_store, store_dir};
use crate::cli::{GlobalOptions, OutputFormat};
use crate::output::formatters::{format_epoch_local, format_size};

/// Show store status/statistics
pub async fn status(opts: &GlobalOptions) -> Result<()> {
    let store = open_store(opts)?;
    let stats = store.stats().await?;

    match opts.format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "total_entries": stats.total_entries,
                "total_size_bytes": stats.total_size_bytes,
                "total_size_human": format_size(stats.total_size_bytes),
                "oldest_entry_timestamp": stats.oldest_entry,
                "newest_entry_timestamp": stats.newest_entry,
                "path": store.path().display().to_string(),
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Pretty => {
            println!("Store Status");
            println!("────────────────────────────────────────");
            println!("Location:       {}", store.path().display());
            println!("Entries:        {}", stats.total_entries);
            println!("Total size:     {}", format_size(stats.total_size_bytes));

            if let Some(oldest) = stats.oldest_entry {
                println!("Oldest entry:   {}", format_epoch_local(oldest));
            }
            if let Some(newest) = stats.newest_entry {
                println!("Newest entry:   {}", format_epoch_local(newest));
            }
        }
    }

    Ok(())
}

/// Clear all stored entries. This also ends the saved session.
pub async fn clear(opts: &GlobalOptions) -> Result<()> {
    let store: SqliteStore = open_store(opts)?;
    let removed = store.clear().await?;

    match opts.format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "entries_removed": removed,
                "success": true,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Pretty => {
            if removed > 0 {
                println!("Cleared {} stored entries", removed);
            } else {
                println!("Store was already empty");
            }
        }
    }

    Ok(())
}

/// Show store path
pub fn path(opts: &GlobalOptions) -> Result<()> {
    println!("{}", store_dir(opts)?.display());
    Ok(())
}
