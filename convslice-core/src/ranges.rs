use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use tracing::{debug, warn};

use crate::conversation::Conversation;
use crate::error::{Result, SliceError};

/// Name given to the single slice produced when no cuts are requested
pub const WHOLE_SLICE_NAME: &str = "whole";

/// A run of consecutive messages destined for one slice.
///
/// Non-empty ranges cover `start..=end`. Zero-length ranges only come out of
/// the marker scanner when empty slices are allowed; they are anchored at the
/// cut position and overlap nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitRange {
    start: usize,
    len: usize,
    pub name: Option<String>,
}

impl SplitRange {
    /// Inclusive range `start..=end`. Callers guarantee `start <= end`.
    pub fn new(start: usize, end: usize, name: Option<String>) -> Self {
        debug_assert!(start <= end, "SplitRange::new called with start > end");
        Self {
            start,
            len: end - start + 1,
            name,
        }
    }

    pub fn empty(at: usize, name: Option<String>) -> Self {
        Self {
            start: at,
            len: 0,
            name,
        }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    /// Inclusive end index, `None` for a zero-length range
    pub fn end(&self) -> Option<usize> {
        (self.len > 0).then(|| self.start + self.len - 1)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn indices(&self) -> Range<usize> {
        self.start..self.start + self.len
    }

    pub fn overlaps(&self, other: &SplitRange) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.start < other.start + other.len
            && other.start < self.start + self.len
    }
}

impl fmt::Display for SplitRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end() {
            Some(end) => write!(f, "{}:{}", self.start, end),
            None => write!(f, "{}:(empty)", self.start),
        }
    }
}

/// One side of a range: a 0-based position or a message id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Index(usize),
    Id(String),
}

impl FromStr for Endpoint {
    type Err = SliceError;

    fn from_str(s: &str) -> Result<Self> {
        if let Some(id) = s.strip_prefix("id:") {
            if id.is_empty() {
                return Err(SliceError::invalid_range(s, "empty message id"));
            }
            return Ok(Endpoint::Id(id.to_string()));
        }
        s.trim()
            .parse::<usize>()
            .map(Endpoint::Index)
            .map_err(|_| SliceError::invalid_range(s, "expected a 0-based index or id:<ID>"))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Index(i) => write!(f, "{i}"),
            Endpoint::Id(id) => write!(f, "id:{id}"),
        }
    }
}

/// A parsed `--range` argument: `start:end[:name]`, where each endpoint is
/// either an integer or `id:<ID>`. Everything after the second endpoint is
/// the name, colons included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeSpec {
    pub start: Endpoint,
    pub end: Endpoint,
    pub name: Option<String>,
    raw: String,
}

impl RangeSpec {
    pub fn raw(&self) -> &str {
        &self.raw
    }

    fn uses_only_ids(&self) -> bool {
        matches!(self.start, Endpoint::Id(_)) && matches!(self.end, Endpoint::Id(_))
    }
}

impl FromStr for RangeSpec {
    type Err = SliceError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        let mut cursor = 0usize;

        let mut take_endpoint = |label: &str| -> Result<Endpoint> {
            match parts.get(cursor) {
                None => Err(SliceError::invalid_range(s, format!("missing {label} endpoint"))),
                Some(&"id") => {
                    let id = parts
                        .get(cursor + 1)
                        .filter(|id| !id.is_empty())
                        .ok_or_else(|| {
                            SliceError::invalid_range(s, format!("malformed {label} id token"))
                        })?;
                    cursor += 2;
                    Ok(Endpoint::Id((*id).to_string()))
                }
                Some(token) => {
                    let index = token.trim().parse::<usize>().map_err(|_| {
                        SliceError::invalid_range(
                            s,
                            format!("{label} must be a 0-based index or id:<ID>, got '{token}'"),
                        )
                    })?;
                    cursor += 1;
                    Ok(Endpoint::Index(index))
                }
            }
        };

        let start = take_endpoint("start")?;
        let end = take_endpoint("end")?;
        let name = parts
            .get(cursor..)
            .map(|rest| rest.join(":"))
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());

        Ok(RangeSpec {
            start,
            end,
            name,
            raw: s.to_string(),
        })
    }
}

/// How the caller asked for the conversation to be cut.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeRequest {
    /// Explicit `--range` arguments, kept in the order given
    Explicit(Vec<RangeSpec>),
    /// `--split-at` boundaries with parallel `--slice-names`
    Boundaries {
        boundaries: Vec<Endpoint>,
        names: Vec<String>,
    },
    /// No cuts: one slice spanning the whole conversation
    Whole,
}

/// Which endpoint forms a run accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointPolicy {
    Any,
    IdsOnly,
}

/// Resolve a range request against the conversation into ordered,
/// pairwise non-overlapping split ranges.
pub fn resolve_ranges(
    conversation: &Conversation,
    request: &RangeRequest,
    policy: EndpointPolicy,
) -> Result<Vec<SplitRange>> {
    let ranges = match request {
        RangeRequest::Explicit(specs) => {
            let mut resolved: Vec<SplitRange> = Vec::with_capacity(specs.len());
            let mut sources: Vec<&str> = Vec::with_capacity(specs.len());
            for spec in specs {
                if policy == EndpointPolicy::IdsOnly && !spec.uses_only_ids() {
                    return Err(SliceError::invalid_range(
                        spec.raw(),
                        "only id:<ID>:id:<ID>[:name] ranges are accepted here",
                    ));
                }
                let start = resolve_endpoint(conversation, &spec.start, spec.raw())?;
                let end = resolve_endpoint(conversation, &spec.end, spec.raw())?;
                if start > end {
                    return Err(SliceError::invalid_range(
                        spec.raw(),
                        format!("start {start} is after end {end}"),
                    ));
                }
                let range = SplitRange::new(start, end, spec.name.clone());
                if let Some(pos) = resolved.iter().position(|other| other.overlaps(&range)) {
                    return Err(SliceError::invalid_range(
                        spec.raw(),
                        format!(
                            "overlaps range '{}' ({})",
                            sources[pos], resolved[pos]
                        ),
                    ));
                }
                resolved.push(range);
                sources.push(spec.raw());
            }
            resolved
        }
        RangeRequest::Boundaries { boundaries, names } => {
            if policy == EndpointPolicy::IdsOnly {
                if let Some(bad) = boundaries.iter().find(|b| matches!(b, Endpoint::Index(_))) {
                    return Err(SliceError::invalid_range(
                        bad.to_string(),
                        "only id:<ID> boundaries are accepted here",
                    ));
                }
            }
            expand_boundaries(conversation, boundaries, names)?
        }
        RangeRequest::Whole => {
            if conversation.is_empty() {
                warn!("conversation has no messages; nothing to slice");
                Vec::new()
            } else {
                vec![SplitRange::new(
                    0,
                    conversation.len() - 1,
                    Some(WHOLE_SLICE_NAME.to_string()),
                )]
            }
        }
    };

    debug!(count = ranges.len(), "resolved split ranges");
    Ok(ranges)
}

fn resolve_endpoint(conversation: &Conversation, endpoint: &Endpoint, spec: &str) -> Result<usize> {
    match endpoint {
        Endpoint::Index(index) => {
            if *index >= conversation.len() {
                Err(SliceError::invalid_range(
                    spec,
                    format!(
                        "index {index} is out of bounds (conversation has {} messages)",
                        conversation.len()
                    ),
                ))
            } else {
                Ok(*index)
            }
        }
        Endpoint::Id(id) => conversation
            .index_of_id(id)
            .ok_or_else(|| SliceError::unknown_message_id(id.clone())),
    }
}

/// `[0, b1], [b1+1, b2], ..., [bk+1, end]`
fn expand_boundaries(
    conversation: &Conversation,
    boundaries: &[Endpoint],
    names: &[String],
) -> Result<Vec<SplitRange>> {
    let mut cuts = Vec::with_capacity(boundaries.len());
    for boundary in boundaries {
        let spec = boundary.to_string();
        let cut = resolve_endpoint(conversation, boundary, &spec)?;
        if let Some(&previous) = cuts.last() {
            if cut <= previous {
                return Err(SliceError::invalid_range(
                    spec,
                    format!("boundaries must be strictly increasing (previous was {previous})"),
                ));
            }
        }
        cuts.push(cut);
    }

    if conversation.is_empty() {
        return Ok(Vec::new());
    }

    let last = conversation.len() - 1;
    let mut ranges = Vec::with_capacity(cuts.len() + 1);
    let mut start = 0usize;
    for cut in cuts {
        let name = names.get(ranges.len()).cloned();
        ranges.push(SplitRange::new(start, cut, name));
        start = cut + 1;
    }
    if start <= last {
        let name = names.get(ranges.len()).cloned();
        ranges.push(SplitRange::new(start, last, name));
    }

    if names.len() > ranges.len() {
        warn!(
            names = names.len(),
            slices = ranges.len(),
            "more slice names than slices; extra names ignored"
        );
    }

    Ok(ranges)
}
