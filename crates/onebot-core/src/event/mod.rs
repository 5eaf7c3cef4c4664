//! OneBot events, **parent-in-child** design.
//!
//! Each event struct embeds its parent via `#[serde(flatten)]` and derefs to
//! it, so every event exposes the common [`EventBase`] fields directly:
//!
//! ```text
//! PrivateMessageEvent  ──Deref──▶  MessageEvent  ──Deref──▶  EventBase
//!   user_id                          message, alt_message     platform, time, self_id,
//!                                                             type, detail_type
//! ```
//!
//! # Event Hierarchy
//!
//! ```text
//! EventBase                                       ← root
//! ├── MessageEvent { message_id, message, alt_message }  type = "message"
//! │   ├── PrivateMessageEvent { user_id }
//! │   └── GroupMessageEvent   { user_id, group_id }
//! ├── NoticeEvent  { extra }                      type = "notice"
//! ├── RequestEvent { extra }                      type = "request"
//! ├── MetaEvent    { extra }                      type = "meta"
//! └── HeartbeatEvent { interval }                 type = "meta", detail_type = "heartbeat"
//! ```
//!
//! Events are validated and stamped by [`Event::try_fix_up`] right before
//! they are broadcast.

mod bus;

pub use bus::{EventBus, EventSubscriber, PushedEvent, SubscriptionId};

use std::ops::{Deref, DerefMut};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::message::Message;

pub const EVENT_TYPE_MESSAGE: &str = "message";
pub const EVENT_TYPE_NOTICE: &str = "notice";
pub const EVENT_TYPE_REQUEST: &str = "request";
pub const EVENT_TYPE_META: &str = "meta";

// ============================================================================
// Event trait
// ============================================================================

/// Implemented by every pushable event.
pub trait Event: Serialize + Send + Sync {
    /// The root fields of this event.
    fn base(&self) -> &EventBase;

    fn base_mut(&mut self) -> &mut EventBase;

    /// `type.detail_type`.
    fn name(&self) -> String {
        self.base().name()
    }

    /// Validates the event and stamps the implementation fields.
    ///
    /// Returns `false` when `self_id`, `type` or `detail_type` is blank; the
    /// event must then be dropped. Otherwise `platform` is set and a missing
    /// or zero `time` is replaced with the current Unix time.
    fn try_fix_up(&mut self, platform: &str) -> bool {
        self.base_mut().stamp(platform)
    }
}

// ============================================================================
// EventBase (Root Level)
// ============================================================================

/// Fields shared by every event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventBase {
    /// Implementation platform, stamped on push.
    #[serde(default)]
    pub platform: String,
    /// Unix time in seconds; defaults to the push time.
    #[serde(default)]
    pub time: Option<i64>,
    /// The bot's own ID.
    #[serde(default)]
    pub self_id: String,
    /// Event type.
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Event detail type.
    #[serde(default)]
    pub detail_type: String,
}

impl EventBase {
    pub fn new(kind: impl Into<String>, detail_type: impl Into<String>, self_id: impl Into<String>) -> Self {
        Self {
            platform: String::new(),
            time: None,
            self_id: self_id.into(),
            kind: kind.into(),
            detail_type: detail_type.into(),
        }
    }

    pub fn name(&self) -> String {
        format!("{}.{}", self.kind, self.detail_type)
    }

    fn stamp(&mut self, platform: &str) -> bool {
        if self.self_id.trim().is_empty()
            || self.kind.trim().is_empty()
            || self.detail_type.trim().is_empty()
        {
            return false;
        }

        if matches!(self.time, None | Some(0)) {
            self.time = Some(unix_now());
        }
        self.platform = platform.to_string();
        true
    }
}

impl Event for EventBase {
    fn base(&self) -> &EventBase {
        self
    }

    fn base_mut(&mut self) -> &mut EventBase {
        self
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Implements `Deref`/`DerefMut` to the parent and [`Event`] through it.
macro_rules! child_event {
    ($ty:ty => $parent:ty) => {
        impl Deref for $ty {
            type Target = $parent;

            fn deref(&self) -> &Self::Target {
                &self.parent
            }
        }

        impl DerefMut for $ty {
            fn deref_mut(&mut self) -> &mut Self::Target {
                &mut self.parent
            }
        }

        impl Event for $ty {
            fn base(&self) -> &EventBase {
                self.parent.base()
            }

            fn base_mut(&mut self) -> &mut EventBase {
                self.parent.base_mut()
            }
        }
    };
}

// ============================================================================
// Message events
// ============================================================================

/// A message event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEvent {
    #[serde(flatten)]
    pub parent: EventBase,
    /// Platform message ID.
    #[serde(default)]
    pub message_id: String,
    /// Message content.
    #[serde(default)]
    pub message: Message,
    /// Plain-text rendering of `message`.
    #[serde(default)]
    pub alt_message: String,
}

impl MessageEvent {
    /// Creates a message event; `alt_message` is derived from the text content.
    pub fn new(
        self_id: impl Into<String>,
        detail_type: impl Into<String>,
        message_id: impl Into<String>,
        message: Message,
    ) -> Self {
        Self {
            parent: EventBase::new(EVENT_TYPE_MESSAGE, detail_type, self_id),
            message_id: message_id.into(),
            alt_message: message.extract_text(),
            message,
        }
    }
}

child_event!(MessageEvent => EventBase);

/// A private (direct) message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivateMessageEvent {
    #[serde(flatten)]
    pub parent: MessageEvent,
    pub user_id: String,
}

impl PrivateMessageEvent {
    pub fn new(
        self_id: impl Into<String>,
        message_id: impl Into<String>,
        user_id: impl Into<String>,
        message: Message,
    ) -> Self {
        Self {
            parent: MessageEvent::new(self_id, "private", message_id, message),
            user_id: user_id.into(),
        }
    }
}

child_event!(PrivateMessageEvent => MessageEvent);

/// A group message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMessageEvent {
    #[serde(flatten)]
    pub parent: MessageEvent,
    pub user_id: String,
    pub group_id: String,
}

impl GroupMessageEvent {
    pub fn new(
        self_id: impl Into<String>,
        message_id: impl Into<String>,
        group_id: impl Into<String>,
        user_id: impl Into<String>,
        message: Message,
    ) -> Self {
        Self {
            parent: MessageEvent::new(self_id, "group", message_id, message),
            user_id: user_id.into(),
            group_id: group_id.into(),
        }
    }
}

child_event!(GroupMessageEvent => MessageEvent);

// ============================================================================
// Notice / request / meta events
// ============================================================================

macro_rules! open_event {
    ($(#[$doc:meta])* $ty:ident, $kind:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        pub struct $ty {
            #[serde(flatten)]
            pub parent: EventBase,
            /// Detail-type specific fields.
            #[serde(flatten)]
            pub extra: Map<String, Value>,
        }

        impl $ty {
            pub fn new(self_id: impl Into<String>, detail_type: impl Into<String>) -> Self {
                Self {
                    parent: EventBase::new($kind, detail_type, self_id),
                    extra: Map::new(),
                }
            }

            /// Adds a detail-type specific field.
            pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
                self.extra.insert(key.into(), value.into());
                self
            }
        }

        child_event!($ty => EventBase);
    };
}

open_event!(
    /// A notice event, e.g. a group member joining.
    NoticeEvent,
    EVENT_TYPE_NOTICE
);
open_event!(
    /// A request event, e.g. a friend request.
    RequestEvent,
    EVENT_TYPE_REQUEST
);
open_event!(
    /// A meta event about the implementation itself.
    MetaEvent,
    EVENT_TYPE_META
);

/// The `meta.heartbeat` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatEvent {
    #[serde(flatten)]
    pub parent: EventBase,
    /// Milliseconds until the next heartbeat.
    pub interval: u64,
}

impl HeartbeatEvent {
    pub fn new(self_id: impl Into<String>, interval: u64) -> Self {
        Self {
            parent: EventBase::new(EVENT_TYPE_META, "heartbeat", self_id),
            interval,
        }
    }
}

child_event!(HeartbeatEvent => EventBase);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_name_and_deref() {
        let event = GroupMessageEvent::new("bot", "m1", "g1", "u1", Message::from("hi"));
        assert_eq!(event.name(), "message.group");
        assert_eq!(event.self_id, "bot");
        assert_eq!(event.alt_message, "hi");
    }

    #[test]
    fn test_fix_up_defaults_time() {
        let mut event = NoticeEvent::new("bot", "group_member_increase");
        assert!(event.try_fix_up("qq"));
        assert_eq!(event.platform, "qq");
        assert!(event.time.is_some_and(|t| t > 0));

        let mut zero = NoticeEvent::new("bot", "friend_increase");
        zero.time = Some(0);
        assert!(zero.try_fix_up("qq"));
        assert_ne!(zero.time, Some(0));
    }

    #[test]
    fn test_fix_up_keeps_explicit_time() {
        let mut event = HeartbeatEvent::new("bot", 5000);
        event.time = Some(1_632_847_927);
        assert!(event.try_fix_up("qq"));
        assert_eq!(event.time, Some(1_632_847_927));
    }

    #[test]
    fn test_fix_up_rejects_blank_fields() {
        assert!(!MetaEvent::new("", "connect").try_fix_up("qq"));
        assert!(!MetaEvent::new("bot", "  ").try_fix_up("qq"));
        let mut no_type = MetaEvent::new("bot", "connect");
        no_type.kind.clear();
        assert!(!no_type.try_fix_up("qq"));
    }

    #[test]
    fn test_flattened_wire_shape() {
        let mut event = PrivateMessageEvent::new("bot", "m1", "u1", Message::new().text("hey"));
        event.time = Some(10);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "platform": "",
                "time": 10,
                "self_id": "bot",
                "type": "message",
                "detail_type": "private",
                "message_id": "m1",
                "message": [{"type": "text", "data": {"text": "hey"}}],
                "alt_message": "hey",
                "user_id": "u1",
            })
        );

        let back: PrivateMessageEvent = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_open_event_extra_fields() {
        let event = NoticeEvent::new("bot", "group_member_increase").with_field("group_id", "g1");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["group_id"], "g1");
        assert_eq!(value["type"], "notice");
    }
}
