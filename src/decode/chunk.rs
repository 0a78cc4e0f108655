//! Upstream chunk records.
//!
//! Each response line is `<hex-id>:<json>`. A handful of ids are fixed by
//! the protocol and carry control data; every other id names one link of a
//! content chain, whose payload points at the next link with `"$@<id>"`.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

/// Reward metadata.
pub const REWARD_CHUNK_ID: &str = "a";
/// The two candidate branches.
pub const BRANCH_SETUP_CHUNK_ID: &str = "1";
/// Which branch the user is looking at.
pub const SELECTION_CHUNK_ID: &str = "e";

const LINK_PREFIX: &str = "$@";
const USER_SELECTED: &str = "USER_SELECTED";

static LINE_PATTERN: OnceLock<Regex> = OnceLock::new();

/// Reference to the next chunk of a content chain (`"$@<id>"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamLinkRef(String);

impl StreamLinkRef {
    /// Parse a `"$@<id>"` string. Anything else is not a link.
    pub fn parse(value: &Value) -> Option<Self> {
        value
            .as_str()?
            .strip_prefix(LINK_PREFIX)
            .filter(|id| !id.is_empty())
            .map(|id| Self(id.to_string()))
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

/// Typed view of a chunk payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkPayload {
    /// Chunk `a`. `reward_id` is set when an unclaimed reward is on offer.
    RewardInfo { reward_id: Option<String> },
    /// Chunk `1`: the `next` link of the left and right branch.
    BranchSetup { branches: [Option<StreamLinkRef>; 2] },
    /// Chunk `e`: index of the first `USER_SELECTED` model selection.
    SelectionEvent { selected: Option<usize> },
    /// A content chain link.
    ContentLink {
        curr: Option<String>,
        next: Option<StreamLinkRef>,
    },
    /// Anything else, including bodies that are not valid JSON.
    Opaque(Value),
}

impl ChunkPayload {
    pub fn classify(id: &str, value: Value) -> Self {
        match id {
            REWARD_CHUNK_ID => Self::RewardInfo {
                reward_id: value
                    .get("unclaimedRewardInfo")
                    .and_then(|info| info.get("rewardId"))
                    .and_then(Value::as_str)
                    .filter(|id| !id.is_empty())
                    .map(str::to_string),
            },
            BRANCH_SETUP_CHUNK_ID if value.is_object() => {
                let branch_next = |key: &str| {
                    value
                        .get(key)
                        .and_then(|branch| branch.get("next"))
                        .and_then(StreamLinkRef::parse)
                };
                Self::BranchSetup {
                    branches: [branch_next("leftStream"), branch_next("rightStream")],
                }
            }
            SELECTION_CHUNK_ID if value.is_object() => {
                let selected = value
                    .get("modelSelections")
                    .and_then(Value::as_array)
                    .and_then(|selections| {
                        selections.iter().position(|s| {
                            s.get("selectionSource").and_then(Value::as_str)
                                == Some(USER_SELECTED)
                        })
                    });
                Self::SelectionEvent { selected }
            }
            _ => match value.as_object() {
                Some(obj) if obj.contains_key("curr") || obj.contains_key("next") => {
                    Self::ContentLink {
                        curr: obj.get("curr").and_then(Value::as_str).map(str::to_string),
                        next: obj.get("next").and_then(StreamLinkRef::parse),
                    }
                }
                _ => Self::Opaque(value),
            },
        }
    }
}

/// One parsed line.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub payload: ChunkPayload,
}

/// Split a line into `(id, body)`. Returns `None` for lines that do not
/// match `<hex-id>:<body>`.
pub fn split_line(line: &str) -> Option<(&str, &str)> {
    let pattern = LINE_PATTERN
        .get_or_init(|| Regex::new(r"(?s)^([0-9a-fA-F]+):(.*)$").expect("valid chunk line regex"));
    let caps = pattern.captures(line)?;
    let id = caps.get(1)?.as_str();
    let body = caps.get(2)?.as_str();
    Some((id, body))
}

/// Parse one response line. Bodies that are not JSON are kept as an opaque
/// string so the chunk still occupies its id.
pub fn parse_line(line: &str) -> Option<Chunk> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let (id, body) = split_line(line)?;
    let body = body.trim();
    let value = if body.is_empty() || body == "{}" {
        Value::Object(serde_json::Map::new())
    } else {
        match serde_json::from_str(body) {
            Ok(value) => value,
            Err(_) => {
                return Some(Chunk {
                    id: id.to_string(),
                    payload: ChunkPayload::Opaque(Value::String(body.to_string())),
                })
            }
        }
    };
    Some(Chunk {
        id: id.to_string(),
        payload: ChunkPayload::classify(id, value),
    })
}
