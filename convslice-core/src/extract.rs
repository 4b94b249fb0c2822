//! Pick a single conversation out of a multi-conversation export.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use regex::{Regex, RegexBuilder};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::conversation::parse_timestamp;
use crate::error::{Result, SliceError};
use crate::render::{to_pretty_json, write_file};

const MAX_LISTED_CANDIDATES: usize = 20;
const CONVERSATION_KEYS: [&str; 3] = ["title", "mapping", "messages"];

/// Filters are ANDed. Unset filters match everything.
#[derive(Debug, Clone, Default)]
pub struct ExtractFilters {
    /// Case-insensitive substring of the title
    pub title: Option<String>,
    /// Exact conversation id
    pub id: Option<String>,
    /// Case-insensitive regex (substring when the pattern does not compile)
    pub snippet: Option<String>,
    /// Inclusive lower bound on the start date
    pub after: Option<NaiveDate>,
    /// Inclusive upper bound on the start date
    pub before: Option<NaiveDate>,
}

/// A conversation that passed the filters.
#[derive(Debug, Clone)]
pub struct Candidate<'a> {
    pub source_index: usize,
    pub conversation: &'a Value,
}

impl Candidate<'_> {
    pub fn id(&self) -> Option<String> {
        conversation_id(self.conversation)
    }

    pub fn title(&self) -> String {
        conversation_title(self.conversation)
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        conversation_start_time(self.conversation)
    }

    fn describe(&self) -> String {
        format!(
            "source_index={}, id={}, title={}, start={}",
            self.source_index,
            self.id().unwrap_or_else(|| "(no id)".to_string()),
            Some(self.title())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "(no title)".to_string()),
            self.start_time()
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "(unknown time)".to_string()),
        )
    }
}

/// Summary of a successful extraction.
#[derive(Debug, Clone)]
pub struct ExtractReport {
    pub source_index: usize,
    pub matches: usize,
    pub id: Option<String>,
    pub title: String,
    pub start_time: Option<DateTime<Utc>>,
}

/// Read an export as a JSON array, a `{"conversations": [...]}` object, an
/// object holding some other list of conversation-like objects, or JSON Lines.
pub fn load_export(path: &Path) -> Result<Vec<Value>> {
    let text = fs::read_to_string(path).map_err(|e| SliceError::filesystem(path, e))?;
    parse_export(&text)
}

pub fn parse_export(text: &str) -> Result<Vec<Value>> {
    if let Ok(document) = serde_json::from_str::<Value>(text) {
        // An empty top-level list is a recognized export with nothing in it
        let listed = document.is_array()
            || document
                .get("conversations")
                .is_some_and(Value::is_array);
        let conversations = conversations_in_document(document);
        if listed || !conversations.is_empty() {
            return Ok(conversations);
        }
    }

    let from_lines: Vec<Value> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .filter(|value| {
            value.as_object().is_some_and(|obj| {
                obj.contains_key("conversation_id")
                    || CONVERSATION_KEYS.iter().any(|key| obj.contains_key(*key))
            })
        })
        .collect();
    if !from_lines.is_empty() {
        debug!(conversations = from_lines.len(), "read export as JSON Lines");
        return Ok(from_lines);
    }

    Err(SliceError::unrecognized_shape(
        "expected a list of conversations, a {\"conversations\": [...]} object, \
         or JSON Lines with one conversation per line",
    ))
}

fn looks_like_conversation(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|obj| CONVERSATION_KEYS.iter().any(|key| obj.contains_key(*key)))
}

fn conversations_in_document(document: Value) -> Vec<Value> {
    match document {
        Value::Array(items) => items,
        Value::Object(mut map) => {
            if let Some(Value::Array(items)) = map.remove("conversations") {
                return items;
            }
            map.into_iter()
                .find_map(|(_, value)| match value {
                    Value::Array(items) if items.first().is_some_and(looks_like_conversation) => {
                        Some(items)
                    }
                    _ => None,
                })
                .unwrap_or_default()
        }
        _ => Vec::new(),
    }
}

pub fn conversation_id(conversation: &Value) -> Option<String> {
    ["conversation_id", "id", "uuid"]
        .iter()
        .find_map(|key| match conversation.get(*key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

pub fn conversation_title(conversation: &Value) -> String {
    conversation
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn raw_messages(conversation: &Value) -> Vec<&Value> {
    if let Some(messages) = conversation.get("messages").and_then(Value::as_array) {
        return messages.iter().collect();
    }
    conversation
        .get("mapping")
        .and_then(Value::as_object)
        .map(|mapping| {
            mapping
                .values()
                .filter_map(|node| node.get("message").filter(|m| m.is_object()))
                .collect()
        })
        .unwrap_or_default()
}

/// The conversation's own timestamp, else its earliest message timestamp.
pub fn conversation_start_time(conversation: &Value) -> Option<DateTime<Utc>> {
    let own = ["create_time", "created_at", "start_time"]
        .iter()
        .find_map(|key| conversation.get(*key).and_then(parse_timestamp));
    if own.is_some() {
        return own;
    }
    raw_messages(conversation)
        .into_iter()
        .filter_map(|message| {
            ["create_time", "created_at", "timestamp"]
                .iter()
                .find_map(|key| message.get(*key).and_then(parse_timestamp))
        })
        .min()
}

/// Text fragments a snippet search looks at for one message.
fn message_chunks(message: &Value) -> Vec<String> {
    let mut chunks = Vec::new();
    match message.get("content") {
        Some(Value::String(text)) => chunks.push(text.clone()),
        Some(Value::Array(items)) => chunks.extend(
            items
                .iter()
                .filter_map(|item| item.as_str().or_else(|| item.get("text").and_then(Value::as_str)))
                .map(str::to_owned),
        ),
        Some(Value::Object(content)) => {
            for value in content.values() {
                match value {
                    Value::String(text) => chunks.push(text.clone()),
                    Value::Array(items) => {
                        chunks.extend(items.iter().filter_map(Value::as_str).map(str::to_owned))
                    }
                    _ => {}
                }
            }
        }
        _ => {}
    }
    if let Some(text) = message.get("text").and_then(Value::as_str) {
        chunks.push(text.to_owned());
    }
    if chunks.is_empty() {
        chunks.push(message.to_string());
    }
    chunks
}

enum SnippetMatcher {
    Pattern(Regex),
    Substring(String),
}

impl SnippetMatcher {
    fn new(snippet: &str) -> Self {
        match RegexBuilder::new(snippet).case_insensitive(true).build() {
            Ok(regex) => SnippetMatcher::Pattern(regex),
            Err(e) => {
                warn!(error = %e, "snippet is not a valid regex; matching it as plain text");
                SnippetMatcher::Substring(snippet.to_lowercase())
            }
        }
    }

    fn is_match(&self, text: &str) -> bool {
        match self {
            SnippetMatcher::Pattern(regex) => regex.is_match(text),
            SnippetMatcher::Substring(needle) => text.to_lowercase().contains(needle),
        }
    }
}

/// All conversations passing every filter, in export order.
pub fn find_matches<'a>(conversations: &'a [Value], filters: &ExtractFilters) -> Vec<Candidate<'a>> {
    let title = filters.title.as_deref().map(str::to_lowercase);
    let snippet = filters.snippet.as_deref().map(SnippetMatcher::new);

    conversations
        .iter()
        .enumerate()
        .filter(|(_, conversation)| {
            if let Some(title) = &title {
                if !conversation_title(conversation).to_lowercase().contains(title) {
                    return false;
                }
            }
            if let Some(id) = &filters.id {
                if conversation_id(conversation).as_deref() != Some(id.as_str()) {
                    return false;
                }
            }
            if filters.after.is_some() || filters.before.is_some() {
                let Some(day) = conversation_start_time(conversation).map(|t| t.date_naive()) else {
                    return false;
                };
                if filters.after.is_some_and(|after| day < after)
                    || filters.before.is_some_and(|before| day > before)
                {
                    return false;
                }
            }
            if let Some(matcher) = &snippet {
                let found = raw_messages(conversation)
                    .into_iter()
                    .flat_map(message_chunks)
                    .any(|chunk| matcher.is_match(&chunk));
                if !found {
                    return false;
                }
            }
            true
        })
        .map(|(source_index, conversation)| Candidate {
            source_index,
            conversation,
        })
        .collect()
}

/// Pick the `index`th match.
pub fn select<'a>(matches: &[Candidate<'a>], index: usize) -> Result<Candidate<'a>> {
    if matches.is_empty() {
        return Err(SliceError::NoMatchingConversation);
    }
    matches.get(index).cloned().ok_or_else(|| {
        let mut candidates = String::new();
        for (position, candidate) in matches.iter().take(MAX_LISTED_CANDIDATES).enumerate() {
            let _ = writeln!(candidates, "  [{position}] {}", candidate.describe());
        }
        SliceError::MatchIndexOutOfRange {
            index,
            matches: matches.len(),
            candidates: candidates.trim_end().to_string(),
        }
    })
}

/// Filter an already loaded export, pick the `index`th match and write it
/// verbatim to `output`.
#[instrument(skip_all, fields(output = %output.display()))]
pub fn extract_from(
    conversations: &[Value],
    output: &Path,
    filters: &ExtractFilters,
    index: usize,
) -> Result<ExtractReport> {
    let matches = find_matches(conversations, filters);
    debug!(
        conversations = conversations.len(),
        matches = matches.len(),
        "filtered export"
    );
    let chosen = select(&matches, index)?;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| SliceError::filesystem(parent, e))?;
    }
    let bytes = to_pretty_json(chosen.conversation, "extracted conversation")?;
    write_file(output, &bytes)?;

    let report = ExtractReport {
        source_index: chosen.source_index,
        matches: matches.len(),
        id: chosen.id(),
        title: chosen.title(),
        start_time: chosen.start_time(),
    };
    info!(
        source_index = report.source_index,
        output = %output.display(),
        "extracted conversation"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn export() -> Vec<Value> {
        vec![
            json!({
                "conversation_id": "c1",
                "title": "Beach birthday",
                "create_time": 1_722_470_400, // 2024-08-01
                "messages": [{"content": "sandcastles at noon"}]
            }),
            json!({
                "id": "c2",
                "title": "Massage evening",
                "mapping": {
                    "n1": {"message": {"create_time": 1_725_148_800, // 2024-09-01
                        "content": {"parts": ["warm oil and candles"]}}}
                }
            }),
            json!({
                "uuid": "c3",
                "title": "Beach walk",
                "created_at": "2024-09-15T08:00:00Z",
                "messages": [{"text": "Shells everywhere"}]
            }),
        ]
    }

    #[test]
    fn parses_export_layouts() {
        assert_eq!(parse_export(r#"[{"title": "a"}, {"title": "b"}]"#).unwrap().len(), 2);
        assert_eq!(
            parse_export(r#"{"conversations": [{"title": "a"}]}"#).unwrap().len(),
            1
        );
        assert_eq!(
            parse_export(r#"{"meta": 1, "items": [{"mapping": {}}]}"#).unwrap().len(),
            1
        );
        assert_eq!(
            parse_export("{\"title\": \"a\"}\n\n{\"conversation_id\": \"b\"}\n{\"other\": 1}\n")
                .unwrap()
                .len(),
            2
        );
        assert!(matches!(
            parse_export("nothing here").unwrap_err(),
            SliceError::UnrecognizedShape { .. }
        ));
    }

    #[test]
    fn empty_export_has_no_matches() {
        assert!(parse_export("[]").unwrap().is_empty());
        let convs = parse_export(r#"{"conversations": []}"#).unwrap();
        assert!(convs.is_empty());

        let dir = TempDir::new().unwrap();
        let output = dir.path().join("one.json");
        let err = extract_from(&convs, &output, &ExtractFilters::default(), 0).unwrap_err();
        assert!(matches!(err, SliceError::NoMatchingConversation));
        assert!(!output.exists());
    }

    #[test]
    fn filters_combine() {
        let convs = export();
        let filters = ExtractFilters {
            title: Some("BEACH".into()),
            ..ExtractFilters::default()
        };
        assert_eq!(find_matches(&convs, &filters).len(), 2);

        let filters = ExtractFilters {
            title: Some("beach".into()),
            after: NaiveDate::from_ymd_opt(2024, 9, 1),
            ..ExtractFilters::default()
        };
        let matches = find_matches(&convs, &filters);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id().as_deref(), Some("c3"));
    }

    #[test]
    fn date_bounds_are_inclusive() {
        let convs = export();
        let day = NaiveDate::from_ymd_opt(2024, 8, 1);
        let filters = ExtractFilters {
            after: day,
            before: day,
            ..ExtractFilters::default()
        };
        let matches = find_matches(&convs, &filters);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].source_index, 0);
    }

    #[test]
    fn start_time_falls_back_to_messages() {
        let convs = export();
        let start = conversation_start_time(&convs[1]).unwrap();
        assert_eq!(start.format("%Y-%m-%d").to_string(), "2024-09-01");
    }

    #[test]
    fn snippet_uses_regex_or_substring() {
        let convs = export();
        let by_regex = ExtractFilters {
            snippet: Some("warm\\s+OIL".into()),
            ..ExtractFilters::default()
        };
        assert_eq!(find_matches(&convs, &by_regex)[0].source_index, 1);

        let by_text = ExtractFilters {
            snippet: Some("shells (every".into()),
            ..ExtractFilters::default()
        };
        assert!(find_matches(&convs, &by_text).is_empty());

        let invalid_but_present = ExtractFilters {
            snippet: Some("noon(".into()),
            ..ExtractFilters::default()
        };
        assert!(find_matches(&convs, &invalid_but_present).is_empty());

        let plain = ExtractFilters {
            snippet: Some("SHELLS".into()),
            ..ExtractFilters::default()
        };
        assert_eq!(find_matches(&convs, &plain)[0].source_index, 2);
    }

    #[test]
    fn selection_errors() {
        let convs = export();
        let none = find_matches(
            &convs,
            &ExtractFilters {
                id: Some("zzz".into()),
                ..ExtractFilters::default()
            },
        );
        assert!(matches!(
            select(&none, 0).unwrap_err(),
            SliceError::NoMatchingConversation
        ));

        let all = find_matches(&convs, &ExtractFilters::default());
        let err = select(&all, 5).unwrap_err();
        match err {
            SliceError::MatchIndexOutOfRange {
                index,
                matches,
                candidates,
            } => {
                assert_eq!(index, 5);
                assert_eq!(matches, 3);
                assert_eq!(candidates.lines().count(), 3);
                assert!(candidates.contains("id=c2"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn extraction_writes_conversation_verbatim() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("nested").join("beach.json");
        let filters = ExtractFilters {
            title: Some("beach".into()),
            ..ExtractFilters::default()
        };
        let report = extract_from(&export(), &output, &filters, 1).unwrap();
        assert_eq!(report.source_index, 2);
        assert_eq!(report.matches, 2);

        let written: Value = serde_json::from_slice(&fs::read(&output).unwrap()).unwrap();
        assert_eq!(written, export()[2]);
    }
}
