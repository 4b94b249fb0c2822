use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::conversation::ConversationMeta;
use crate::error::Result;
use crate::render::{to_pretty_json, write_file};
use crate::writer::Slice;

pub const MANIFEST_FILE_NAME: &str = "index.json";

/// `index.json`: one entry per slice, in sequence order.
#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub source_file: String,
    pub mode: String,
    pub conversation_id: String,
    pub conversation_title: String,
    pub date: String,
    pub time: String,
    pub tags: Vec<String>,
    pub slices: Vec<Slice>,
}

pub struct ManifestContext<'a> {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub source: &'a Path,
    pub mode: &'a str,
    pub conversation: &'a ConversationMeta,
    pub tags: &'a [String],
}

pub fn build_manifest(mut slices: Vec<Slice>, ctx: &ManifestContext<'_>) -> Manifest {
    slices.sort_by_key(|slice| slice.sequence);
    let source_file = ctx
        .source
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| ctx.source.display().to_string());

    Manifest {
        run_id: ctx.run_id,
        generated_at: ctx.generated_at,
        source_file,
        mode: ctx.mode.to_string(),
        conversation_id: ctx.conversation.id.clone(),
        conversation_title: ctx.conversation.title.clone(),
        date: ctx.conversation.date(),
        time: ctx.conversation.time(),
        tags: ctx.tags.to_vec(),
        slices,
    }
}

impl Manifest {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        to_pretty_json(self, MANIFEST_FILE_NAME)
    }

    pub fn write(&self, out_dir: &Path) -> Result<()> {
        let path = out_dir.join(MANIFEST_FILE_NAME);
        write_file(&path, &self.to_bytes()?)?;
        debug!(path = %path.display(), slices = self.slices.len(), "wrote manifest");
        Ok(())
    }
}
