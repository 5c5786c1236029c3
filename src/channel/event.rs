//! Realtime event wire format
//!
//! Frames are JSON envelopes `{ "en": <event name>, "ed": <event data> }`.
//! Entity change events carry the changed id under a per-kind field name
//! (`templateId`, `entryId`, ...) plus a `type` discriminator; the topic
//! determines which field holds the id.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Synthetic topic receiving every event regardless of name
pub const TOPIC_ALL: &str = "all";

/// Backend announcement carrying this connection's id
pub const TOPIC_CONNECTION: &str = "socket_connection";

pub const TOPIC_TEMPLATE: &str = "template";
pub const TOPIC_ENTRY: &str = "entry";
pub const TOPIC_GROUP: &str = "group";
pub const TOPIC_WIDGET: &str = "widget";
pub const TOPIC_MEDIA: &str = "media";
pub const TOPIC_LANGUAGE: &str = "language";
pub const TOPIC_ENTRY_STATUS: &str = "entry_status";

/// Wire envelope for one frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub en: String,
    pub ed: Value,
}

/// One decoded event as delivered to topic handlers
#[derive(Debug, Clone)]
pub struct SocketEvent {
    pub name: String,
    pub data: Value,
}

/// Entity change payload shared by all entity topics
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub kind: String,
    pub id: String,
}

/// Payload field carrying the changed id for one topic
fn id_field(topic: &str) -> Option<&'static str> {
    match topic {
        TOPIC_TEMPLATE => Some("templateId"),
        TOPIC_ENTRY => Some("entryId"),
        TOPIC_GROUP => Some("groupId"),
        TOPIC_WIDGET => Some("widgetId"),
        TOPIC_MEDIA => Some("mediaId"),
        TOPIC_LANGUAGE => Some("languageId"),
        TOPIC_ENTRY_STATUS => Some("entryStatusId"),
        _ => None,
    }
}

impl ChangeEvent {
    /// Decode an entity change from one event
    ///
    /// The id is read from the field named after the event's topic, so
    /// payloads carrying extra context (an entry event also naming its
    /// `templateId`, say) decode cleanly.
    pub fn decode(event: &SocketEvent) -> Result<Self> {
        let field = id_field(&event.name)
            .ok_or_else(|| Error::Channel(format!("no change id field for \"{}\"", event.name)))?;
        let kind = event
            .data
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Channel(format!("\"{}\" event without a type", event.name)))?;
        let id = event
            .data
            .get(field)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::Channel(format!("\"{}\" event without {}", event.name, field))
            })?;
        Ok(Self {
            kind: kind.to_string(),
            id: id.to_string(),
        })
    }

    /// Single-item refresh; anything else is treated as an eviction
    pub fn is_update(&self) -> bool {
        self.kind == "update"
    }
}
