//! `markers`, `index` and `ids`: cut one conversation into slice files

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use convslice_core::config::{CliOverrides, Settings, SortMode};
use convslice_core::pipeline::{run, RunOptions, RunReport, SplitMode};
use convslice_core::ranges::{Endpoint, RangeRequest, RangeSpec};
use tracing::debug;

use crate::ui;

/// Flags shared by every split subcommand.
#[derive(Args, Debug)]
pub struct CommonArgs {
    /// Conversation JSON to split
    #[arg(long = "in", short = 'i', visible_alias = "input", value_name = "FILE")]
    pub input: PathBuf,

    /// Directory for slice files and index.json
    #[arg(long = "out", short = 'o', visible_alias = "outdir", value_name = "DIR")]
    pub output: PathBuf,

    /// Name unnamed slices after their first message and record a human title
    #[arg(long)]
    pub auto_title: bool,

    /// Report what would be written without touching the output directory
    #[arg(long)]
    pub dry_run: bool,

    /// Config file (YAML, TOML or JSON); defaults to the standard search paths
    #[arg(long, value_name = "PATH", env = "CONVSLICE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Filename template; tokens: {date} {time} {id} {slice} {slug} {n} {n:0W}
    #[arg(long, value_name = "TEMPLATE")]
    pub filename_template: Option<String>,

    /// Maximum slug length in characters
    #[arg(long, value_name = "N")]
    pub slug_maxlen: Option<usize>,

    /// Message ordering: as-given or chronological
    #[arg(long, value_name = "MODE")]
    pub sort_mode: Option<SortMode>,

    /// Record a SHA-256 checksum for every slice
    #[arg(long, overrides_with = "no_sha256")]
    pub sha256: bool,

    /// Skip slice checksums
    #[arg(long, overrides_with = "sha256")]
    pub no_sha256: bool,

    /// Keep zero-length slices between adjacent markers
    #[arg(long)]
    pub allow_empty: bool,

    /// Base name for slices without one
    #[arg(long, value_name = "NAME")]
    pub default_slice_name: Option<String>,

    /// Tag recorded in every slice and the manifest (repeatable)
    #[arg(long = "tag", value_name = "VALUE")]
    pub tags: Vec<String>,
}

impl CommonArgs {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            filename_template: self.filename_template.clone(),
            slug_maxlen: self.slug_maxlen,
            sort_mode: self.sort_mode,
            include_sha256: match (self.sha256, self.no_sha256) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            },
            allow_empty_slices: self.allow_empty.then_some(true),
            default_slice_name: self.default_slice_name.clone(),
            tags: self.tags.clone(),
        }
    }

    fn settings(&self) -> Result<Settings> {
        Settings::load(self.config.as_deref(), &self.overrides()).context("failed to load settings")
    }
}

#[derive(Args, Debug)]
pub struct RangeArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Slice as START:END[:NAME], END inclusive; endpoints are 0-based indices or id:<ID> (repeatable)
    #[arg(long = "range", value_name = "SPEC", conflicts_with = "split_at")]
    pub ranges: Vec<RangeSpec>,

    /// Cut after each of these positions (0-based index or id:<ID>)
    #[arg(long = "split-at", value_name = "N", num_args = 1..)]
    pub split_at: Vec<Endpoint>,

    /// Names for the --split-at slices, in order
    #[arg(long = "slice-names", value_name = "NAME", num_args = 1.., requires = "split_at")]
    pub slice_names: Vec<String>,
}

impl RangeArgs {
    fn request(&self) -> RangeRequest {
        if !self.ranges.is_empty() {
            RangeRequest::Explicit(self.ranges.clone())
        } else if !self.split_at.is_empty() {
            RangeRequest::Boundaries {
                boundaries: self.split_at.clone(),
                names: self.slice_names.clone(),
            }
        } else {
            RangeRequest::Whole
        }
    }
}

pub fn run_markers(args: CommonArgs) -> Result<()> {
    execute(&args, SplitMode::Markers, RangeRequest::Whole)
}

pub fn run_ranges(args: RangeArgs, mode: SplitMode) -> Result<()> {
    let request = args.request();
    execute(&args.common, mode, request)
}

fn execute(args: &CommonArgs, mode: SplitMode, request: RangeRequest) -> Result<()> {
    let settings = args.settings()?;
    debug!(?settings, "effective settings");

    let options = RunOptions {
        input: args.input.clone(),
        output_dir: args.output.clone(),
        mode,
        request,
        auto_title: args.auto_title,
        dry_run: args.dry_run,
    };
    let report = run(&options, &settings)
        .with_context(|| format!("failed to split {}", args.input.display()))?;

    print_report(&report);
    Ok(())
}

fn print_report(report: &RunReport) {
    if report.dry_run {
        ui::say("Dry run: nothing written");
    }
    ui::say(format!("Slices: {}", report.manifest.slices.len()));
    ui::say(format!("Output dir: {}", report.output_dir.display()));
    for slice in &report.manifest.slices {
        let mut line = format!(" - {} ({} messages)", slice.file_name, slice.message_count);
        if let Some(sha) = &slice.sha256 {
            line.push_str(&format!("  [{}…]", &sha[..8.min(sha.len())]));
        }
        if let Some(title) = &slice.human_title {
            line.push_str(&format!("  \"{title}\""));
        }
        ui::say(line);
    }
    if !report.dry_run {
        ui::say(format!("Manifest: {}", report.manifest_path().display()));
    }
}
