use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::config::Settings;
use crate::conversation::{Conversation, Message};
use crate::error::{Result, SliceError};
use crate::manifest::MANIFEST_FILE_NAME;
use crate::ranges::SplitRange;
use crate::render::{to_pretty_json, write_file};
use crate::slug::{derive_human_title, slice_slug, text_slug, NameRegistry};
use crate::template::{render_filename, TemplateContext};

/// Inclusive message range of a slice. `end` is `None` for an empty slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SliceRange {
    pub start: usize,
    pub end: Option<usize>,
}

impl From<&SplitRange> for SliceRange {
    fn from(range: &SplitRange) -> Self {
        Self {
            start: range.start(),
            end: range.end(),
        }
    }
}

/// Metadata of one slice file, as listed in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Slice {
    pub file_name: String,
    pub name: String,
    pub sequence: usize,
    pub range: SliceRange,
    pub message_count: usize,
    pub slug: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub human_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// A fully rendered slice awaiting its write.
#[derive(Debug, Clone)]
pub struct SlicePlan {
    pub slice: Slice,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PlanOptions {
    /// Derive unnamed slice names from their first message and record a human title
    pub auto_title: bool,
}

#[derive(Serialize)]
struct SliceDocument<'a> {
    id: &'a str,
    title: &'a str,
    date: &'a str,
    time: &'a str,
    slice: &'a str,
    sequence: usize,
    slug: &'a str,
    tags: &'a [String],
    human_title: Option<&'a str>,
    range: SliceRange,
    message_count: usize,
    messages: &'a [Message],
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Render every slice in memory and check the file names before anything
/// touches the filesystem.
pub fn plan_slices(
    conversation: &Conversation,
    ranges: &[SplitRange],
    settings: &Settings,
    options: PlanOptions,
) -> Result<Vec<SlicePlan>> {
    let meta = &conversation.meta;
    let date = meta.date();
    let time = meta.time();

    let mut names = NameRegistry::new();
    let mut file_names: HashMap<String, usize> = HashMap::with_capacity(ranges.len());
    let mut unknown_tokens: Vec<String> = Vec::new();
    let mut plans = Vec::with_capacity(ranges.len());

    for (offset, range) in ranges.iter().enumerate() {
        let sequence = offset + 1;
        let messages = &conversation.messages[range.indices()];

        let base_name = range
            .name
            .clone()
            .or_else(|| {
                options
                    .auto_title
                    .then(|| text_slug(messages, settings.slug_maxlen))
                    .flatten()
            })
            .unwrap_or_else(|| settings.default_slice_name.clone());
        let name = names.claim(&base_name);
        let slug = slice_slug(messages, Some(&name), settings.slug_maxlen);
        let human_title = if options.auto_title {
            derive_human_title(messages)
        } else {
            None
        };

        let rendered = render_filename(
            &settings.filename_template,
            &TemplateContext {
                date: &date,
                time: &time,
                id: &meta.id,
                slice: &name,
                slug: &slug,
                sequence,
            },
        );
        for token in rendered.unknown_tokens {
            if !unknown_tokens.contains(&token) {
                warn!(token = %token, "unknown filename template token left verbatim");
                unknown_tokens.push(token);
            }
        }
        let file_name = rendered.file_name;

        if file_name == MANIFEST_FILE_NAME {
            return Err(SliceError::FilenameCollision {
                file_name,
                sequence,
                other: "the manifest".to_string(),
            });
        }
        if let Some(first) = file_names.get(&file_name) {
            return Err(SliceError::FilenameCollision {
                file_name,
                sequence,
                other: format!("slice {first}"),
            });
        }
        file_names.insert(file_name.clone(), sequence);

        let slice_range = SliceRange::from(range);
        let document = SliceDocument {
            id: &meta.id,
            title: &meta.title,
            date: &date,
            time: &time,
            slice: &name,
            sequence,
            slug: &slug,
            tags: &settings.tags,
            human_title: human_title.as_deref(),
            range: slice_range,
            message_count: messages.len(),
            messages,
        };
        let bytes = to_pretty_json(&document, &format!("slice {sequence}"))?;
        let sha256 = settings.include_sha256.then(|| sha256_hex(&bytes));

        debug!(
            sequence,
            name = %name,
            file = %file_name,
            messages = messages.len(),
            "planned slice"
        );

        plans.push(SlicePlan {
            slice: Slice {
                file_name,
                name,
                sequence,
                range: slice_range,
                message_count: messages.len(),
                slug,
                human_title,
                sha256,
            },
            bytes,
        });
    }

    Ok(plans)
}

/// Write one planned slice into `out_dir`, or only report it in a dry run.
pub fn write_slice(plan: &SlicePlan, out_dir: &Path, dry_run: bool) -> Result<Slice> {
    if !dry_run {
        let path = slice_path(out_dir, &plan.slice);
        write_file(&path, &plan.bytes)?;
        debug!(path = %path.display(), bytes = plan.bytes.len(), "wrote slice");
    }
    Ok(plan.slice.clone())
}

pub fn slice_path(out_dir: &Path, slice: &Slice) -> PathBuf {
    out_dir.join(&slice.file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{normalize, NormalizeOptions};
    use serde_json::{json, Value};
    use tempfile::TempDir;

    fn conversation(contents: &[&str]) -> Conversation {
        let messages: Vec<_> = contents
            .iter()
            .enumerate()
            .map(|(i, c)| json!({"id": format!("m{i}"), "role": "user", "content": c}))
            .collect();
        normalize(
            json!({"id": "abc", "title": "Cosy", "create_time": 1_736_942_400, "messages": messages}),
            &NormalizeOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn plans_carry_metadata_and_checksums() {
        let conv = conversation(&["Good morning love", "hi", "Breakfast time", "eggs"]);
        let ranges = vec![
            SplitRange::new(0, 1, Some("morning".into())),
            SplitRange::new(2, 3, None),
        ];
        let plans = plan_slices(&conv, &ranges, &Settings::default(), PlanOptions::default())
            .unwrap();

        assert_eq!(plans.len(), 2);
        let first = &plans[0].slice;
        assert_eq!(first.sequence, 1);
        assert_eq!(first.name, "morning");
        assert_eq!(first.slug, "good-morning-love");
        assert_eq!(
            first.file_name,
            "convo_2025-01-15_12-00-00_abc_morning_good-morning-love.json"
        );
        assert_eq!(first.sha256.as_deref(), Some(sha256_hex(&plans[0].bytes).as_str()));
        assert_eq!(plans[1].slice.name, "slice");

        let doc: Value = serde_json::from_slice(&plans[0].bytes).unwrap();
        assert_eq!(doc["slice"], "morning");
        assert_eq!(doc["sequence"], 1);
        assert_eq!(doc["message_count"], 2);
        assert_eq!(doc["messages"][1]["id"], "m1");
        assert_eq!(doc["range"]["end"], 1);
        assert!(doc["human_title"].is_null());
    }

    #[test]
    fn generated_message_ids_are_flagged_in_slices() {
        let conv = normalize(
            json!({"messages": [{"id": "a", "content": "kept"}, {"content": "no id"}]}),
            &NormalizeOptions::default(),
        )
        .unwrap();
        let ranges = vec![SplitRange::new(0, 1, None)];
        let plans = plan_slices(&conv, &ranges, &Settings::default(), PlanOptions::default())
            .unwrap();

        let doc: Value = serde_json::from_slice(&plans[0].bytes).unwrap();
        assert!(doc["messages"][0].get("id_synthesized").is_none());
        assert_eq!(doc["messages"][1]["id"], "msg-1");
        assert_eq!(doc["messages"][1]["id_synthesized"], true);
    }

    #[test]
    fn auto_title_names_unnamed_slices() {
        let conv = conversation(&["Good morning love", "Pancakes please\nwith syrup"]);
        let ranges = vec![SplitRange::new(0, 0, None), SplitRange::new(1, 1, None)];
        let plans = plan_slices(
            &conv,
            &ranges,
            &Settings::default(),
            PlanOptions { auto_title: true },
        )
        .unwrap();
        assert_eq!(plans[0].slice.name, "good-morning-love");
        assert_eq!(plans[1].slice.name, "pancakes-please-with-syrup");
        assert_eq!(plans[1].slice.human_title.as_deref(), Some("Pancakes please"));
    }

    #[test]
    fn repeated_names_are_suffixed() {
        let conv = conversation(&["a", "b", "c"]);
        let ranges: Vec<_> = (0..3).map(|i| SplitRange::new(i, i, None)).collect();
        let plans =
            plan_slices(&conv, &ranges, &Settings::default(), PlanOptions::default()).unwrap();
        let names: Vec<_> = plans.iter().map(|p| p.slice.name.as_str()).collect();
        assert_eq!(names, vec!["slice", "slice-2", "slice-3"]);
    }

    #[test]
    fn colliding_file_names_are_rejected() {
        let conv = conversation(&["same", "same"]);
        let settings = Settings {
            filename_template: "{slug}.json".into(),
            ..Settings::default()
        };
        let ranges = vec![SplitRange::new(0, 0, None), SplitRange::new(1, 1, None)];
        let err = plan_slices(&conv, &ranges, &settings, PlanOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            SliceError::FilenameCollision { sequence: 2, ref other, .. } if other == "slice 1"
        ));
    }

    #[test]
    fn manifest_name_is_reserved() {
        let conv = conversation(&["x"]);
        let settings = Settings {
            filename_template: "index.json".into(),
            ..Settings::default()
        };
        let err = plan_slices(
            &conv,
            &[SplitRange::new(0, 0, None)],
            &settings,
            PlanOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, SliceError::FilenameCollision { .. }));
    }

    #[test]
    fn checksum_can_be_disabled() {
        let conv = conversation(&["x"]);
        let settings = Settings {
            include_sha256: false,
            ..Settings::default()
        };
        let plans = plan_slices(
            &conv,
            &[SplitRange::new(0, 0, None)],
            &settings,
            PlanOptions::default(),
        )
        .unwrap();
        assert_eq!(plans[0].slice.sha256, None);
    }

    #[test]
    fn empty_slice_uses_its_name_for_the_slug() {
        let conv = conversation(&["a", "b"]);
        let ranges = vec![SplitRange::empty(1, Some("Quiet Moment".into()))];
        let plans =
            plan_slices(&conv, &ranges, &Settings::default(), PlanOptions::default()).unwrap();
        assert_eq!(plans[0].slice.slug, "quiet-moment");
        assert_eq!(plans[0].slice.message_count, 0);
        assert_eq!(plans[0].slice.range.end, None);
    }

    #[test]
    fn dry_run_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let conv = conversation(&["a"]);
        let plans = plan_slices(
            &conv,
            &[SplitRange::new(0, 0, None)],
            &Settings::default(),
            PlanOptions::default(),
        )
        .unwrap();

        let reported = write_slice(&plans[0], dir.path(), true).unwrap();
        assert_eq!(reported, plans[0].slice);
        assert!(!slice_path(dir.path(), &reported).exists());

        let written = write_slice(&plans[0], dir.path(), false).unwrap();
        let on_disk = std::fs::read(slice_path(dir.path(), &written)).unwrap();
        assert_eq!(on_disk, plans[0].bytes);
        assert_eq!(written.sha256, Some(sha256_hex(&on_disk)));
    }
}
