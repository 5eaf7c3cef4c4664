//! Messages as ordered lists of segments.
//!
//! ```rust,ignore
//! use onebot_core::Message;
//!
//! let msg = Message::new()
//!     .text("Hello, ")
//!     .mention("10001")
//!     .text("!");
//!
//! assert_eq!(msg.extract_text(), "Hello, !");
//! ```

use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::segment::Segment;

/// A message composed of segments.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Message {
    segments: Vec<Segment>,
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_segments(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    // --------------------------------
    // Builder methods
    // --------------------------------

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.segments.push(Segment::text(text));
        self
    }

    pub fn mention(mut self, user_id: impl Into<String>) -> Self {
        self.segments.push(Segment::mention(user_id));
        self
    }

    pub fn mention_all(mut self) -> Self {
        self.segments.push(Segment::mention_all());
        self
    }

    /// Appends an extended `<prefix>_<kind>` segment.
    pub fn extended(mut self, prefix: &str, kind: &str, data: Value) -> Self {
        self.segments.push(Segment::extended(prefix, kind, data));
        self
    }

    pub fn segment(mut self, segment: Segment) -> Self {
        self.segments.push(segment);
        self
    }

    // --------------------------------
    // Inspection
    // --------------------------------

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn into_segments(self) -> Vec<Segment> {
        self.segments
    }

    /// Concatenates the content of every text segment.
    pub fn extract_text(&self) -> String {
        self.segments.iter().filter_map(Segment::as_text).collect()
    }

    /// Merges runs of adjacent text segments into one.
    ///
    /// Non-text segments are left in place, so reducing twice is the same as
    /// reducing once.
    pub fn reduce(&mut self) {
        let mut reduced: Vec<Segment> = Vec::with_capacity(self.segments.len());
        for segment in self.segments.drain(..) {
            if let (Some(Segment::Text { text: last }), Segment::Text { text }) =
                (reduced.last_mut(), &segment)
            {
                last.push_str(text);
                continue;
            }
            reduced.push(segment);
        }
        self.segments = reduced;
    }

    /// Builder-style [`reduce`](Self::reduce).
    pub fn reduced(mut self) -> Self {
        self.reduce();
        self
    }
}

impl Deref for Message {
    type Target = Vec<Segment>;

    fn deref(&self) -> &Self::Target {
        &self.segments
    }
}

impl DerefMut for Message {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.segments
    }
}

impl From<Vec<Segment>> for Message {
    fn from(segments: Vec<Segment>) -> Self {
        Self { segments }
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Self::new().text(text)
    }
}

impl FromIterator<Segment> for Message {
    fn from_iter<I: IntoIterator<Item = Segment>>(iter: I) -> Self {
        Self {
            segments: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Message {
    type Item = Segment;
    type IntoIter = std::vec::IntoIter<Segment>;

    fn into_iter(self) -> Self::IntoIter {
        self.segments.into_iter()
    }
}

// ============================================================================
// Serialization / Deserialization
// ============================================================================

impl Serialize for Message {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.segments.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Message {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // A bare string is accepted as a single text segment.
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum MessageFormat {
            Array(Vec<Segment>),
            String(String),
        }

        match MessageFormat::deserialize(deserializer)? {
            MessageFormat::Array(segments) => Ok(Self { segments }),
            MessageFormat::String(text) => Ok(Self::from(text.as_str())),
        }
    }
}
