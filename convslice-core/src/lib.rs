pub mod config;
pub mod conversation;
pub mod error;
pub mod extract;
pub mod manifest;
pub mod markers;
pub mod pipeline;
pub mod ranges;
pub mod render;
pub mod slug;
pub mod template;
pub mod writer;

pub use config::{CliOverrides, Settings, SortMode};
pub use conversation::{normalize, Conversation, ConversationMeta, InputShape, Message, NormalizeOptions};
pub use error::{ErrorKind, Result, SliceError};
pub use extract::{extract_from, load_export, ExtractFilters, ExtractReport};
pub use manifest::{build_manifest, Manifest, MANIFEST_FILE_NAME};
pub use markers::{find_markers, scan_markers, SplitMarker};
pub use pipeline::{run, RunOptions, RunReport, SplitMode};
pub use ranges::{resolve_ranges, Endpoint, EndpointPolicy, RangeRequest, RangeSpec, SplitRange};
pub use writer::{plan_slices, write_slice, PlanOptions, Slice, SlicePlan};
