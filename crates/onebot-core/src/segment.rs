//! Message segments.
//!
//! A segment is a `{type, data}` pair on the wire. The core types get their
//! own variants; every other type is kept as an [`Segment::Extended`]
//! segment with its raw `data` object, so implementations can carry
//! platform segments without registering them anywhere.
//!
//! ```rust,ignore
//! use onebot_core::Segment;
//!
//! let text = Segment::text("hello");
//! let mention = Segment::mention("10001");
//! let face = Segment::extended("qq", "face", json!({"id": 178}));
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

pub const TEXT: &str = "text";
pub const MENTION: &str = "mention";
pub const MENTION_ALL: &str = "mention_all";

/// A single unit of message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSegment", into = "RawSegment")]
pub enum Segment {
    /// Plain text.
    Text {
        /// Text content.
        text: String,
    },
    /// Mention a user.
    Mention {
        /// Mentioned user.
        user_id: String,
    },
    /// Mention everyone.
    MentionAll,
    /// Any non-core segment type, usually `<prefix>_<type>`.
    Extended {
        /// Full segment type.
        kind: String,
        /// Raw segment data.
        data: Map<String, Value>,
    },
}

impl Segment {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn mention(user_id: impl Into<String>) -> Self {
        Self::Mention {
            user_id: user_id.into(),
        }
    }

    pub fn mention_all() -> Self {
        Self::MentionAll
    }

    /// Creates an extended segment of type `<prefix>_<kind>`.
    ///
    /// Non-object `data` is stored as an empty object.
    pub fn extended(prefix: &str, kind: &str, data: Value) -> Self {
        let data = match data {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self::Extended {
            kind: format!("{prefix}_{kind}"),
            data,
        }
    }

    /// Returns the wire `type` of this segment.
    pub fn kind(&self) -> &str {
        match self {
            Self::Text { .. } => TEXT,
            Self::Mention { .. } => MENTION,
            Self::MentionAll => MENTION_ALL,
            Self::Extended { kind, .. } => kind,
        }
    }

    /// Returns the text content of a text segment.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text { .. })
    }
}

impl From<&str> for Segment {
    fn from(text: &str) -> Self {
        Self::text(text)
    }
}

impl From<String> for Segment {
    fn from(text: String) -> Self {
        Self::text(text)
    }
}

// ============================================================================
// Wire representation
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawSegment {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
struct TextData {
    text: String,
}

#[derive(Deserialize)]
struct MentionData {
    user_id: String,
}

impl TryFrom<RawSegment> for Segment {
    type Error = serde_json::Error;

    fn try_from(raw: RawSegment) -> Result<Self, Self::Error> {
        Ok(match raw.kind.as_str() {
            TEXT => {
                let TextData { text } = serde_json::from_value(raw.data)?;
                Self::Text { text }
            }
            MENTION => {
                let MentionData { user_id } = serde_json::from_value(raw.data)?;
                Self::Mention { user_id }
            }
            MENTION_ALL => Self::MentionAll,
            _ => Self::Extended {
                data: match raw.data {
                    Value::Object(map) => map,
                    _ => Map::new(),
                },
                kind: raw.kind,
            },
        })
    }
}

impl From<Segment> for RawSegment {
    fn from(segment: Segment) -> Self {
        let (kind, data) = match segment {
            Segment::Text { text } => (TEXT.to_string(), json!({ "text": text })),
            Segment::Mention { user_id } => (MENTION.to_string(), json!({ "user_id": user_id })),
            Segment::MentionAll => (MENTION_ALL.to_string(), json!({})),
            Segment::Extended { kind, data } => (kind, Value::Object(data)),
        };
        Self { kind, data }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_serialize() {
        let value = serde_json::to_value(Segment::text("hi")).unwrap();
        assert_eq!(value, json!({"type": "text", "data": {"text": "hi"}}));

        let value = serde_json::to_value(Segment::mention_all()).unwrap();
        assert_eq!(value, json!({"type": "mention_all", "data": {}}));
    }

    #[test]
    fn test_segment_deserialize() {
        let segment: Segment =
            serde_json::from_value(json!({"type": "mention", "data": {"user_id": "42"}})).unwrap();
        assert_eq!(segment, Segment::mention("42"));

        let segment: Segment =
            serde_json::from_value(json!({"type": "qq_face", "data": {"id": 178}})).unwrap();
        assert_eq!(segment.kind(), "qq_face");
        assert_eq!(segment, Segment::extended("qq", "face", json!({"id": 178})));

        let broken = serde_json::from_value::<Segment>(json!({"type": "text", "data": {}}));
        assert!(broken.is_err());
    }
}
