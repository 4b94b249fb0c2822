//! `extract`: pull one conversation out of a multi-conversation export

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Args;
use convslice_core::extract::{extract_from, load_export, ExtractFilters};

use crate::ui;

#[derive(Args, Debug)]
pub struct ExtractArgs {
    /// JSON or JSON Lines export holding many conversations
    #[arg(value_name = "EXPORT")]
    pub input: PathBuf,

    /// Where to write the selected conversation
    #[arg(long, short = 'o', value_name = "FILE")]
    pub output: PathBuf,

    /// Case-insensitive substring of the conversation title
    #[arg(long, value_name = "TEXT")]
    pub by_title: Option<String>,

    /// Exact conversation id
    #[arg(long, value_name = "ID")]
    pub by_id: Option<String>,

    /// Regex (or plain text) searched in message content, case-insensitive
    #[arg(long, value_name = "PATTERN")]
    pub by_snippet: Option<String>,

    /// Only conversations started on or after this day (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub after: Option<NaiveDate>,

    /// Only conversations started on or before this day (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub before: Option<NaiveDate>,

    /// Which match to take when several remain (0-based)
    #[arg(long, default_value_t = 0)]
    pub index: usize,
}

pub fn run_extract(args: ExtractArgs) -> Result<()> {
    let conversations = ui::with_spinner(
        format!("Loading {}", args.input.display()),
        |convs: &Vec<_>| format!("Loaded {} conversations", convs.len()),
        || load_export(&args.input),
    )
    .with_context(|| format!("failed to read export {}", args.input.display()))?;

    let filters = ExtractFilters {
        title: args.by_title,
        id: args.by_id,
        snippet: args.by_snippet,
        after: args.after,
        before: args.before,
    };
    let report = extract_from(&conversations, &args.output, &filters, args.index)?;

    ui::say(format!(
        "Extracted conversation -> id={}, title={}, start={}",
        report.id.as_deref().unwrap_or("(no id)"),
        if report.title.is_empty() {
            "(no title)"
        } else {
            report.title.as_str()
        },
        report
            .start_time
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "(unknown time)".to_string()),
    ));
    if report.matches > 1 {
        ui::say(format!(
            "Picked match {} of {} (use --index to choose another)",
            args.index, report.matches
        ));
    }
    ui::say(format!("Saved to {}", args.output.display()));
    Ok(())
}
