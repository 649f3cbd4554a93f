//! Decoding of inbound platform updates.
//!
//! Every field other than the variant itself is decoded independently and
//! leniently: a field that is missing or has an unexpected shape becomes `None`
//! instead of failing the whole update.

use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;

/// Message keys that carry a non-text payload the bot does not handle.
const UNSUPPORTED_CONTENT_KEYS: &[&str] = &[
    "animation", "audio", "contact", "dice", "document", "game", "photo", "poll", "sticker", "venue", "video", "video_note", "voice",
];

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Location {
    pub longitude: f64,
    pub latitude: f64,
    #[serde(default)]
    pub horizontal_accuracy: Option<f64>,
}

/// A `message` update, or the message a callback originated from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageEvent {
    pub message_id: Option<i64>,
    pub from: Option<User>,
    pub chat: Option<Chat>,
    pub text: Option<String>,
    pub location: Option<Location>,
    /// The first populated payload key the bot does not handle (e.g. `photo`).
    pub unsupported: Option<String>,
}

/// A `callback_query` update: an inline keyboard button was pressed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallbackEvent {
    pub id: Option<String>,
    pub from: Option<User>,
    pub data: Option<String>,
    pub message: Option<MessageEvent>,
}

/// One inbound update, by variant.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Message(MessageEvent),
    CallbackQuery(CallbackEvent),
    /// Any other variant, by key. Empty if the update had no variant at all.
    Other(String),
}

fn field<T: DeserializeOwned>(value: &Value, key: &str) -> Option<T> {
    value.get(key).and_then(|v| T::deserialize(v).ok())
}

impl MessageEvent {
    pub fn from_value(value: &Value) -> Self {
        Self {
            message_id: field(value, "message_id"),
            from: field(value, "from"),
            chat: field(value, "chat"),
            text: field(value, "text"),
            location: field(value, "location"),
            unsupported: UNSUPPORTED_CONTENT_KEYS.iter().find(|key| value.get(**key).is_some_and(|v| !v.is_null())).map(|key| key.to_string()),
        }
    }
}

impl CallbackEvent {
    pub fn from_value(value: &Value) -> Self {
        Self {
            id: field(value, "id"),
            from: field(value, "from"),
            data: field(value, "data"),
            message: value.get("message").filter(|v| v.is_object()).map(MessageEvent::from_value),
        }
    }
}

impl InboundEvent {
    /// Selects the populated variant of an update and decodes it.
    pub fn from_update(update: &Value) -> Self {
        let Some(object) = update.as_object() else {
            return InboundEvent::Other(String::new());
        };

        if let Some(callback) = object.get("callback_query") {
            return InboundEvent::CallbackQuery(CallbackEvent::from_value(callback));
        }

        if let Some(message) = object.get("message") {
            return InboundEvent::Message(MessageEvent::from_value(message));
        }

        let kind = object.keys().find(|key| key.as_str() != "update_id").cloned().unwrap_or_default();

        InboundEvent::Other(kind)
    }

    pub fn kind(&self) -> &str {
        match self {
            InboundEvent::Message(_) => "message",
            InboundEvent::CallbackQuery(_) => "callback_query",
            InboundEvent::Other(kind) => kind,
        }
    }
}

// Tests.

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_text_message() {
        let update = json!({
            "update_id": 1,
            "message": {
                "message_id": 5,
                "from": { "id": 11, "is_bot": false, "first_name": "Ada" },
                "chat": { "id": -100, "type": "group" },
                "date": 1700000000,
                "text": "/weather"
            }
        });

        let InboundEvent::Message(message) = InboundEvent::from_update(&update) else {
            panic!("expected a message");
        };

        assert_eq!(message.from.unwrap().id, 11);
        assert_eq!(message.chat.unwrap().id, -100);
        assert_eq!(message.text.as_deref(), Some("/weather"));
        assert_eq!(message.unsupported, None);
    }

    #[test]
    fn malformed_fields_become_absent() {
        let update = json!({
            "update_id": 1,
            "message": { "from": "not a user", "chat": { "id": 3 }, "text": 42 }
        });

        let InboundEvent::Message(message) = InboundEvent::from_update(&update) else {
            panic!("expected a message");
        };

        assert_eq!(message.from, None);
        assert_eq!(message.text, None);
        assert_eq!(message.chat.map(|c| c.id), Some(3));
    }

    #[test]
    fn records_unsupported_payload() {
        let update = json!({ "update_id": 1, "message": { "from": { "id": 1 }, "chat": { "id": 1 }, "sticker": { "file_id": "x" } } });

        let InboundEvent::Message(message) = InboundEvent::from_update(&update) else {
            panic!("expected a message");
        };

        assert_eq!(message.unsupported.as_deref(), Some("sticker"));
    }

    #[test]
    fn decodes_callback_with_origin_message() {
        let update = json!({
            "update_id": 2,
            "callback_query": {
                "id": "cb-1",
                "from": { "id": 11, "is_bot": false, "first_name": "Ada" },
                "data": "/weather forecast24",
                "message": { "message_id": 9, "chat": { "id": -200, "type": "group" } }
            }
        });

        let InboundEvent::CallbackQuery(callback) = InboundEvent::from_update(&update) else {
            panic!("expected a callback");
        };

        assert_eq!(callback.id.as_deref(), Some("cb-1"));
        assert_eq!(callback.message.and_then(|m| m.chat).map(|c| c.id), Some(-200));
    }

    #[test]
    fn other_variants_are_named() {
        assert_eq!(InboundEvent::from_update(&json!({ "update_id": 3, "edited_message": {} })), InboundEvent::Other("edited_message".to_string()));
        assert_eq!(InboundEvent::from_update(&json!([1, 2])), InboundEvent::Other(String::new()));
    }
}
