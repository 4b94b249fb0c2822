use std::collections::{HashMap, HashSet};

use crate::config::DEFAULT_SLICE_NAME;
use crate::conversation::Message;

const HUMAN_TITLE_MAX_CHARS: usize = 80;

/// Hands out slice names in sequence order, suffixing repeats with `-2`, `-3`, ...
#[derive(Debug, Default)]
pub struct NameRegistry {
    counts: HashMap<String, usize>,
    issued: HashSet<String>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(&mut self, base: &str) -> String {
        let count = self.counts.entry(base.to_string()).or_insert(0);
        loop {
            *count += 1;
            let candidate = if *count == 1 {
                base.to_string()
            } else {
                format!("{base}-{count}")
            };
            if self.issued.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}

/// Lowercase ASCII alphanumerics joined by single dashes. Other ASCII acts as
/// a separator; non-ASCII characters are dropped.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut last_was_dash = false;

    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_was_dash = false;
        } else if ch.is_ascii() && !slug.is_empty() && !last_was_dash {
            slug.push('-');
            last_was_dash = true;
        }
    }

    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

pub fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cut `text` to at most `max_chars` characters, preferring the last
/// whitespace boundary. A single word longer than the limit is hard cut.
pub fn truncate_on_whitespace(text: &str, max_chars: usize) -> &str {
    let Some((cut, next)) = text.char_indices().nth(max_chars) else {
        return text;
    };
    let prefix = &text[..cut];
    if next.is_whitespace() {
        return prefix.trim_end();
    }
    match prefix.rfind(char::is_whitespace) {
        Some(boundary) if !prefix[..boundary].trim().is_empty() => prefix[..boundary].trim_end(),
        _ => prefix,
    }
}

fn bounded_slug(text: &str, max_chars: usize) -> Option<String> {
    let slug = slugify(truncate_on_whitespace(&collapse_whitespace(text), max_chars));
    (!slug.is_empty()).then_some(slug)
}

/// Slug of the first message with text, if it yields one.
pub fn text_slug(messages: &[Message], max_chars: usize) -> Option<String> {
    messages
        .iter()
        .find(|m| m.has_text())
        .and_then(|m| bounded_slug(&m.content, max_chars))
}

/// Slug for a slice: from its first message with text, else from its name,
/// else `slice`.
pub fn slice_slug(messages: &[Message], name: Option<&str>, max_chars: usize) -> String {
    text_slug(messages, max_chars)
        .or_else(|| name.and_then(|name| bounded_slug(name, max_chars)))
        .unwrap_or_else(|| DEFAULT_SLICE_NAME.to_string())
}

/// First line of the first non-empty user message, else of the first
/// non-empty assistant message, capped at 80 characters.
pub fn derive_human_title(messages: &[Message]) -> Option<String> {
    let first_line = |role: &str| {
        messages
            .iter()
            .find(|m| m.role == role && m.has_text())
            .and_then(|m| m.content.trim().lines().next())
            .map(|line| line.trim().chars().take(HUMAN_TITLE_MAX_CHARS).collect::<String>())
    };
    first_line("user").or_else(|| first_line("assistant"))
}
