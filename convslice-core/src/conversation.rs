use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::SortMode;
use crate::error::{Result, SliceError};

const UNKNOWN_CONVERSATION_ID: &str = "unknown_id";
const UNTITLED_CONVERSATION: &str = "Untitled Conversation";

/// The two document layouts an export can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputShape {
    /// `{ "messages": [ ... ] }`
    FlatMessageList,
    /// `{ "mapping": { node_id: { parent, children, message }, ... } }`
    MappingTree,
}

impl InputShape {
    /// Select the shape by inspecting top-level keys. A `messages` list wins
    /// over a `mapping` object when a document carries both.
    pub fn detect(value: &Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(SliceError::unrecognized_shape(
                "expected a JSON object at the top level",
            ));
        };
        if matches!(map.get("messages"), Some(Value::Array(_))) {
            Ok(InputShape::FlatMessageList)
        } else if matches!(map.get("mapping"), Some(Value::Object(_))) {
            Ok(InputShape::MappingTree)
        } else {
            Err(SliceError::unrecognized_shape(
                "expected a 'messages' list or a 'mapping' object",
            ))
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InputShape::FlatMessageList => "messages",
            InputShape::MappingTree => "mapping",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub index: usize,
    pub id: String,
    /// True when the source carried no id and `id` was generated from the index
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub id_synthesized: bool,
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    pub raw: Value,
}

impl Message {
    pub fn has_text(&self) -> bool {
        !self.content.trim().is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ConversationMeta {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub shape: InputShape,
}

impl ConversationMeta {
    /// `YYYY-MM-DD`, as used by the `{date}` filename token
    pub fn date(&self) -> String {
        self.created_at.format("%Y-%m-%d").to_string()
    }

    /// `HH-MM-SS`, as used by the `{time}` filename token
    pub fn time(&self) -> String {
        self.created_at.format("%H-%M-%S").to_string()
    }
}

/// A normalized conversation: metadata plus messages with contiguous indices.
#[derive(Debug, Clone)]
pub struct Conversation {
    pub meta: ConversationMeta,
    pub messages: Vec<Message>,
    id_index: HashMap<String, usize>,
}

impl Conversation {
    fn new(meta: ConversationMeta, messages: Vec<Message>) -> Self {
        let mut id_index = HashMap::with_capacity(messages.len());
        for message in &messages {
            if id_index.contains_key(&message.id) {
                warn!(
                    message_id = %message.id,
                    index = message.index,
                    "duplicate message id; id lookups resolve to the first occurrence"
                );
                continue;
            }
            id_index.insert(message.id.clone(), message.index);
        }
        Self {
            meta,
            messages,
            id_index,
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Position of the first message carrying `id`
    pub fn index_of_id(&self, id: &str) -> Option<usize> {
        self.id_index.get(id).copied()
    }
}

#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    pub sort_mode: SortMode,
    /// Used as the conversation timestamp when the document has none
    pub fallback_time: DateTime<Utc>,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            sort_mode: SortMode::AsGiven,
            fallback_time: Utc::now(),
        }
    }
}

/// A message pulled out of the document before final ordering and indexing.
struct RawMessage {
    id: Option<String>,
    role: String,
    content: String,
    created_at: Option<DateTime<Utc>>,
    raw: Value,
}

/// Turn an export document into an ordered, indexed conversation.
pub fn normalize(document: Value, opts: &NormalizeOptions) -> Result<Conversation> {
    let shape = InputShape::detect(&document)?;
    let Value::Object(mut root) = document else {
        return Err(SliceError::unrecognized_shape(
            "expected a JSON object at the top level",
        ));
    };

    let created_at = ["create_time", "created_at", "created", "start_time"]
        .iter()
        .find_map(|key| root.get(*key).and_then(parse_timestamp))
        .unwrap_or(opts.fallback_time);

    let meta = ConversationMeta {
        id: ["id", "conversation_id"]
            .iter()
            .find_map(|key| root.get(*key).and_then(scalar_to_string))
            .unwrap_or_else(|| UNKNOWN_CONVERSATION_ID.to_string()),
        title: root
            .get("title")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(UNTITLED_CONVERSATION)
            .to_string(),
        created_at,
        shape,
    };

    let mut raw_messages = match shape {
        InputShape::FlatMessageList => {
            let items = match root.remove("messages") {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            };
            extract_flat(items)
        }
        InputShape::MappingTree => {
            let current_node = root
                .get("current_node")
                .and_then(Value::as_str)
                .map(str::to_owned);
            let mapping = match root.remove("mapping") {
                Some(Value::Object(map)) => map,
                _ => Map::new(),
            };
            extract_mapping(mapping, current_node.as_deref())
        }
    };

    if opts.sort_mode == SortMode::Chronological {
        raw_messages.sort_by_key(|m| m.created_at.unwrap_or(created_at));
    }

    let messages: Vec<Message> = raw_messages
        .into_iter()
        .enumerate()
        .map(|(index, raw)| {
            let (id, id_synthesized) = match raw.id {
                Some(id) => (id, false),
                None => (format!("msg-{index}"), true),
            };
            Message {
                index,
                id,
                id_synthesized,
                role: raw.role,
                content: raw.content,
                created_at: raw.created_at,
                raw: raw.raw,
            }
        })
        .collect();

    debug!(
        conversation_id = %meta.id,
        shape = shape.as_str(),
        messages = messages.len(),
        "normalized conversation"
    );

    Ok(Conversation::new(meta, messages))
}

fn extract_flat(items: Vec<Value>) -> Vec<RawMessage> {
    items
        .into_iter()
        .map(|value| {
            let id = ["id", "message_id", "uuid"]
                .iter()
                .find_map(|key| value.get(*key).and_then(scalar_to_string));
            let role = value
                .get("role")
                .or_else(|| value.get("author").and_then(|a| a.get("role")))
                .or_else(|| value.get("sender"))
                .and_then(Value::as_str)
                .unwrap_or("user")
                .to_string();
            let created_at = ["create_time", "created_at", "timestamp"]
                .iter()
                .find_map(|key| value.get(*key).and_then(parse_timestamp));
            RawMessage {
                id,
                role,
                content: extract_message_text(&value),
                created_at,
                raw: value,
            }
        })
        .collect()
}

fn extract_mapping(mapping: Map<String, Value>, current_node: Option<&str>) -> Vec<RawMessage> {
    let order = mapping_order(&mapping, current_node);
    let linked = order.linked;

    let mut messages: Vec<RawMessage> = order
        .node_ids
        .into_iter()
        .filter_map(|node_id| {
            let node = mapping.get(&node_id)?;
            let message = node.get("message").filter(|m| m.is_object())?;
            let id = message
                .get("id")
                .and_then(scalar_to_string)
                .or_else(|| Some(node_id.clone()));
            let role = message
                .get("author")
                .and_then(|a| a.get("role"))
                .and_then(Value::as_str)
                .unwrap_or("user")
                .to_string();
            let created_at = message.get("create_time").and_then(parse_timestamp);
            Some(RawMessage {
                id,
                role,
                content: extract_message_text(message),
                created_at,
                raw: node.clone(),
            })
        })
        .collect();

    // A mapping without any parent/child links carries no order of its own
    if !linked {
        debug!("mapping has no parent/child links; ordering nodes by create_time");
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    }

    messages
}

struct MappingOrder {
    node_ids: Vec<String>,
    linked: bool,
}

fn parent_of<'a>(mapping: &'a Map<String, Value>, node_id: &str) -> Option<&'a str> {
    mapping
        .get(node_id)
        .and_then(|node| node.get("parent"))
        .and_then(Value::as_str)
        .filter(|parent| mapping.contains_key(*parent))
}

/// Child lists built from both directions of the links: each node's
/// `children` array, then any node naming it as `parent`, in mapping order.
fn child_index(mapping: &Map<String, Value>) -> HashMap<&str, Vec<&str>> {
    let mut index: HashMap<&str, Vec<&str>> = HashMap::new();
    for (node_id, node) in mapping {
        let listed = node
            .get("children")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .filter(|child| mapping.contains_key(*child));
        for child in listed {
            let entry = index.entry(node_id.as_str()).or_default();
            if !entry.contains(&child) {
                entry.push(child);
            }
        }
    }
    for node_id in mapping.keys() {
        if let Some(parent) = parent_of(mapping, node_id) {
            let entry = index.entry(parent).or_default();
            if !entry.contains(&node_id.as_str()) {
                entry.push(node_id.as_str());
            }
        }
    }
    index
}

/// Linearize the node tree. With a known `current_node` the active branch is
/// recovered by walking parents back to the root; otherwise each root is
/// followed down through its last child.
fn mapping_order(mapping: &Map<String, Value>, current_node: Option<&str>) -> MappingOrder {
    let children = child_index(mapping);
    let linked = !children.is_empty();

    if let Some(current) = current_node.filter(|c| mapping.contains_key(*c)) {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = Some(current);
        while let Some(node_id) = cursor {
            if !seen.insert(node_id) {
                warn!(node_id, "cycle in mapping parent links; truncating branch");
                break;
            }
            chain.push(node_id.to_string());
            cursor = parent_of(mapping, node_id);
        }
        chain.reverse();
        return MappingOrder {
            node_ids: chain,
            linked: true,
        };
    }

    let mut node_ids = Vec::with_capacity(mapping.len());
    let mut seen = HashSet::new();
    let roots = mapping
        .keys()
        .filter(|id| parent_of(mapping, id).is_none());
    for root in roots {
        let mut cursor = Some(root.as_str());
        while let Some(node_id) = cursor {
            if !seen.insert(node_id) {
                break;
            }
            node_ids.push(node_id.to_string());
            cursor = children
                .get(node_id)
                .and_then(|kids| kids.iter().rev().find(|child| !seen.contains(*child)))
                .copied();
        }
    }

    let skipped: Vec<&str> = mapping
        .iter()
        .filter(|(id, node)| {
            !seen.contains(id.as_str()) && node.get("message").is_some_and(Value::is_object)
        })
        .map(|(id, _)| id.as_str())
        .collect();
    if !skipped.is_empty() {
        warn!(
            skipped = skipped.len(),
            first = skipped[0],
            "mapping nodes with messages are not on the followed branch; leaving them out"
        );
    }

    MappingOrder { node_ids, linked }
}

fn extract_message_text(value: &Value) -> String {
    match value.get("content") {
        Some(Value::String(text)) => return text.clone(),
        Some(Value::Object(content)) => {
            if let Some(Value::Array(parts)) = content.get("parts") {
                let joined = parts
                    .iter()
                    .filter_map(|part| {
                        part.as_str()
                            .or_else(|| part.get("text").and_then(Value::as_str))
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                return joined;
            }
            if let Some(text) = content.get("text").and_then(Value::as_str) {
                return text.to_owned();
            }
        }
        Some(Value::Array(blocks)) => {
            let joined = blocks
                .iter()
                .filter_map(|block| {
                    block
                        .as_str()
                        .or_else(|| block.get("text").and_then(Value::as_str))
                })
                .collect::<Vec<_>>()
                .join("\n\n");
            if !joined.is_empty() {
                return joined;
            }
        }
        _ => {}
    }

    value
        .get("text")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .unwrap_or_default()
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Accepts unix seconds (integer or fractional) or a handful of string layouts.
pub(crate) fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => {
            let seconds = n.as_f64()?;
            DateTime::<Utc>::from_timestamp_millis((seconds * 1000.0).round() as i64)
        }
        Value::String(s) => parse_timestamp_str(s),
        _ => None,
    }
}

pub(crate) fn parse_timestamp_str(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f %z") {
        return Some(dt.with_timezone(&Utc));
    }
    [
        "%Y-%m-%dT%H:%M:%S%.fZ",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
    ]
    .iter()
    .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
    .map(|naive| naive.and_utc())
}
