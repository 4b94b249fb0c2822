use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::conversation::Conversation;
use crate::ranges::{SplitRange, WHOLE_SLICE_NAME};

/// `[[SPLIT]]`, `[[SPLIT HERE]]` or `[[SPLIT: name]]`, case-insensitive.
static SPLIT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\[\[\s*SPLIT(?:\s+HERE)?\s*(?::\s*([^\]]*?))?\s*\]\]").expect("split regex")
});

/// A message carrying a split directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitMarker {
    pub index: usize,
    /// Name for the slice that follows the marker
    pub name: Option<String>,
}

/// Parse the first split directive in `text`, if any. The inner option is the
/// directive's name.
pub fn parse_marker(text: &str) -> Option<Option<String>> {
    let captures = SPLIT_RE.captures(text)?;
    let name = captures
        .get(1)
        .map(|m| m.as_str().trim().to_string())
        .filter(|name| !name.is_empty());
    Some(name)
}

pub fn find_markers(conversation: &Conversation) -> Vec<SplitMarker> {
    conversation
        .messages
        .iter()
        .filter_map(|message| {
            parse_marker(&message.content).map(|name| SplitMarker {
                index: message.index,
                name,
            })
        })
        .collect()
}

/// Cut the conversation at every marker message. Marker messages belong to no
/// slice. Segments with no messages are kept as zero-length ranges only when
/// `allow_empty` is set.
pub fn scan_markers(conversation: &Conversation, allow_empty: bool) -> Vec<SplitRange> {
    let markers = find_markers(conversation);
    debug!(markers = markers.len(), "scanned for split markers");

    if markers.is_empty() {
        if conversation.is_empty() {
            warn!("conversation has no messages; nothing to slice");
            return Vec::new();
        }
        return vec![SplitRange::new(
            0,
            conversation.len() - 1,
            Some(WHOLE_SLICE_NAME.to_string()),
        )];
    }

    let mut ranges = Vec::with_capacity(markers.len() + 1);
    let mut push_segment = |start: usize, end_exclusive: usize, name: Option<String>| {
        if end_exclusive > start {
            ranges.push(SplitRange::new(start, end_exclusive - 1, name));
        } else if allow_empty {
            ranges.push(SplitRange::empty(start, name));
        } else {
            warn!(
                at = start,
                name = name.as_deref().unwrap_or(""),
                "dropping empty slice between split markers"
            );
        }
    };

    let mut start = 0usize;
    let mut pending_name: Option<String> = None;
    for marker in markers {
        push_segment(start, marker.index, pending_name.take());
        pending_name = marker.name;
        start = marker.index + 1;
    }
    push_segment(start, conversation.len(), pending_name);

    ranges
}
