//! Timetable command implementation

use colored::Colorize;

use apspace::error::Result;
use apspace::timetable::StudentTimetable;

use crate::cli::{CommandContext, GlobalOptions, OutputFormat};
use crate::output::formatters::truncate;
use crate::output::{print_value, spinner};

/// Run the timetable command
pub async fn run(opts: &GlobalOptions, intake: Option<&str>, refresh: bool) -> Result<()> {
    let ctx = CommandContext::new(opts).await?;

    let progress = spinner("Fetching timetable...");
    let result = ctx.timetable().get(refresh, intake).await;
    progress.finish_and_clear();
    let mut classes = result?;
    classes.sort_by(|a, b| {
        (a.date(), a.start_time(), &a.module_id).cmp(&(b.date(), b.start_time(), &b.module_id))
    });

    if ctx.format == OutputFormat::Json {
        return print_value(&classes, ctx.format, ctx.is_offline());
    }

    if classes.is_empty() {
        println!("{}", "No classes found.".dimmed());
        return Ok(());
    }
    if ctx.is_offline() {
        println!("{}\n", "Offline: showing the last stored timetable".yellow());
    }
    print_pretty(&classes);
    Ok(())
}

fn print_pretty(classes: &[StudentTimetable]) {
    let mut current_date: Option<&str> = None;
    for class in classes {
        if current_date != Some(class.datestamp_iso.as_str()) {
            if current_date.is_some() {
                println!();
            }
            println!("{} {}", class.day.bold(), class.datestamp_iso.bold());
            current_date = Some(class.datestamp_iso.as_str());
        }
        println!(
            "  {} - {}  {:<20} {:<12} {}",
            class.time_from.cyan(),
            class.time_to.cyan(),
            truncate(&class.module_id, 20),
            truncate(&class.room, 12),
            class.lecturer_name.dimmed()
        );
    }
}
