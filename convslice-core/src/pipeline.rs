use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::config::Settings;
use crate::conversation::{normalize, Conversation, NormalizeOptions};
use crate::error::{Result, SliceError};
use crate::manifest::{build_manifest, Manifest, ManifestContext, MANIFEST_FILE_NAME};
use crate::markers::scan_markers;
use crate::ranges::{resolve_ranges, EndpointPolicy, RangeRequest, SplitRange};
use crate::writer::{plan_slices, write_slice, PlanOptions};

/// How cut points are found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitMode {
    /// Inline `[[SPLIT]]` directives
    Markers,
    /// Explicit ranges or boundaries, by index or id
    Index,
    /// Explicit ranges or boundaries, ids only
    Ids,
}

impl SplitMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SplitMode::Markers => "markers",
            SplitMode::Index => "index",
            SplitMode::Ids => "ids",
        }
    }
}

impl fmt::Display for SplitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub mode: SplitMode,
    /// Ignored in marker mode
    pub request: RangeRequest,
    pub auto_title: bool,
    pub dry_run: bool,
}

/// What a run produced (or would produce, in a dry run).
#[derive(Debug, Clone)]
pub struct RunReport {
    pub manifest: Manifest,
    pub output_dir: PathBuf,
    pub dry_run: bool,
}

impl RunReport {
    pub fn manifest_path(&self) -> PathBuf {
        self.output_dir.join(MANIFEST_FILE_NAME)
    }

    pub fn total_messages(&self) -> usize {
        self.manifest.slices.iter().map(|s| s.message_count).sum()
    }
}

/// Read and parse the input document.
pub fn load_document(path: &Path) -> Result<Value> {
    let data = fs::read(path).map_err(|e| SliceError::filesystem(path, e))?;
    serde_json::from_slice(&data).map_err(|e| SliceError::json(path.display().to_string(), e))
}

/// Cut points for a conversation under the given mode.
pub fn resolve_split_ranges(
    conversation: &Conversation,
    mode: SplitMode,
    request: &RangeRequest,
    settings: &Settings,
) -> Result<Vec<SplitRange>> {
    match mode {
        SplitMode::Markers => Ok(scan_markers(conversation, settings.allow_empty_slices)),
        SplitMode::Index => resolve_ranges(conversation, request, EndpointPolicy::Any),
        SplitMode::Ids => resolve_ranges(conversation, request, EndpointPolicy::IdsOnly),
    }
}

/// Normalize, cut, plan, then write slices and the manifest. Every slice is
/// planned and validated before the output directory is touched; a dry run
/// never touches it at all.
#[instrument(skip_all, fields(mode = opts.mode.as_str(), dry_run = opts.dry_run))]
pub fn run(opts: &RunOptions, settings: &Settings) -> Result<RunReport> {
    let generated_at = Utc::now();
    let run_id = Uuid::new_v4();

    let document = load_document(&opts.input)?;
    let conversation = normalize(
        document,
        &NormalizeOptions {
            sort_mode: settings.sort_mode,
            fallback_time: generated_at,
        },
    )?;
    info!(
        conversation_id = %conversation.meta.id,
        messages = conversation.len(),
        "loaded conversation"
    );

    let ranges = resolve_split_ranges(&conversation, opts.mode, &opts.request, settings)?;
    let plans = plan_slices(
        &conversation,
        &ranges,
        settings,
        PlanOptions {
            auto_title: opts.auto_title,
        },
    )?;

    if !opts.dry_run {
        fs::create_dir_all(&opts.output_dir)
            .map_err(|e| SliceError::filesystem(&opts.output_dir, e))?;
    }

    let mut slices = Vec::with_capacity(plans.len());
    for plan in &plans {
        slices.push(write_slice(plan, &opts.output_dir, opts.dry_run)?);
    }

    let manifest = build_manifest(
        slices,
        &ManifestContext {
            run_id,
            generated_at,
            source: &opts.input,
            mode: opts.mode.as_str(),
            conversation: &conversation.meta,
            tags: &settings.tags,
        },
    );

    if opts.dry_run {
        debug!("dry run; nothing written");
    } else {
        manifest.write(&opts.output_dir)?;
    }

    info!(
        run_id = %run_id,
        slices = manifest.slices.len(),
        output = %opts.output_dir.display(),
        "split complete"
    );

    Ok(RunReport {
        manifest,
        output_dir: opts.output_dir.clone(),
        dry_run: opts.dry_run,
    })
}
