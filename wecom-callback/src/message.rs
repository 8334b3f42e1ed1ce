//! Decoded callback messages and the collaborator that consumes them.
//!
//! The platform delivers messages as flat XML. Older integrations (and the
//! plaintext test tooling) post a JSON object with lowercase keys instead,
//! so both are accepted.

use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::xml::element_text;

/// Message type carried in `MsgType` / `msgtype`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Image,
    Voice,
    Video,
    Event,
    Other(String),
}

impl From<&str> for MessageKind {
    fn from(value: &str) -> Self {
        match value {
            "text" => Self::Text,
            "image" => Self::Image,
            "voice" => Self::Voice,
            "video" => Self::Video,
            "event" => Self::Event,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Event type carried in `Event` / `event`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Subscribe,
    Unsubscribe,
    EnterAgent,
    Location,
    Click,
    Other(String),
}

impl From<&str> for EventKind {
    fn from(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "subscribe" => Self::Subscribe,
            "unsubscribe" => Self::Unsubscribe,
            "enter_agent" => Self::EnterAgent,
            "location" => Self::Location,
            "click" => Self::Click,
            _ => Self::Other(value.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    #[error("message body is empty")]
    Empty,

    #[error("message JSON is invalid: {0}")]
    Json(String),

    #[error("message is neither XML nor a JSON object")]
    UnknownFormat,
}

/// A message or event delivered to the callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub kind: MessageKind,
    pub to_user: Option<String>,
    pub from_user: Option<String>,
    pub create_time: Option<String>,
    pub agent_id: Option<String>,
    pub content: Option<String>,
    pub media_id: Option<String>,
    pub event: Option<EventKind>,
    pub event_key: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
}

impl InboundMessage {
    /// Parse a decrypted (or plaintext) message body.
    pub fn parse(body: &str) -> Result<Self, MessageError> {
        let body = body.trim();

        if body.is_empty() {
            Err(MessageError::Empty)
        } else if body.starts_with('<') {
            Ok(Self::from_xml(body))
        } else if body.starts_with('{') {
            Self::from_json(body)
        } else {
            Err(MessageError::UnknownFormat)
        }
    }

    fn from_xml(xml: &str) -> Self {
        let field = |tag: &str| element_text(xml, tag).filter(|s| !s.is_empty());

        Self {
            kind: field("MsgType")
                .map(|t| MessageKind::from(t.as_str()))
                .unwrap_or_else(|| MessageKind::Other("unknown".to_string())),
            to_user: field("ToUserName"),
            from_user: field("FromUserName"),
            create_time: field("CreateTime"),
            agent_id: field("AgentID"),
            content: field("Content"),
            media_id: field("MediaId"),
            event: field("Event").map(|e| EventKind::from(e.as_str())),
            event_key: field("EventKey"),
            latitude: field("Latitude"),
            longitude: field("Longitude"),
        }
    }

    fn from_json(json: &str) -> Result<Self, MessageError> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| MessageError::Json(e.to_string()))?;

        if !value.is_object() {
            return Err(MessageError::UnknownFormat);
        }

        let field = |keys: &[&str]| keys.iter().find_map(|key| json_string(&value, key));

        Ok(Self {
            kind: field(&["msgtype", "MsgType"])
                .map(|t| MessageKind::from(t.as_str()))
                .unwrap_or_else(|| MessageKind::Other("unknown".to_string())),
            to_user: field(&["touser", "ToUserName"]),
            from_user: field(&["fromuser", "FromUserName"]),
            create_time: field(&["createtime", "CreateTime"]),
            agent_id: field(&["agentid", "AgentID"]),
            content: field(&["content", "Content"]),
            media_id: field(&["mediaid", "MediaId"]),
            event: field(&["event", "Event"]).map(|e| EventKind::from(e.as_str())),
            event_key: field(&["eventkey", "EventKey"]),
            latitude: field(&["latitude", "Latitude"]),
            longitude: field(&["longitude", "Longitude"]),
        })
    }
}

/// Read a JSON field as a string, accepting numbers too (`agentid` is numeric).
fn json_string(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Consumer of decoded messages.
///
/// Returning `Some(content)` sends `content` back as a passive reply; `None`
/// acknowledges the delivery.
pub trait MessageHandler: Send + Sync {
    fn handle(&self, message: &InboundMessage) -> Option<String>;
}

/// Logs every message and never replies.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingMessageHandler;

impl MessageHandler for LoggingMessageHandler {
    fn handle(&self, message: &InboundMessage) -> Option<String> {
        info!(
            msg_type = ?message.kind,
            to_user = ?message.to_user,
            from_user = ?message.from_user,
            agent_id = ?message.agent_id,
            "message_received"
        );

        match &message.kind {
            MessageKind::Text => {
                let content_length = message.content.as_ref().map_or(0, |c| c.len());
                info!(content_length, "message_text");
            }
            MessageKind::Image | MessageKind::Voice | MessageKind::Video => {
                info!(msg_type = ?message.kind, media_id = ?message.media_id, "message_media");
            }
            MessageKind::Event => log_event(message),
            MessageKind::Other(kind) => {
                info!(msg_type = %kind, "message_unhandled_type");
            }
        }

        None
    }
}

fn log_event(message: &InboundMessage) {
    match &message.event {
        Some(EventKind::Subscribe) => info!(from_user = ?message.from_user, "event_subscribe"),
        Some(EventKind::Unsubscribe) => info!(from_user = ?message.from_user, "event_unsubscribe"),
        Some(EventKind::EnterAgent) => info!(from_user = ?message.from_user, "event_enter_agent"),
        Some(EventKind::Location) => info!(
            latitude = ?message.latitude,
            longitude = ?message.longitude,
            "event_location"
        ),
        Some(EventKind::Click) => info!(event_key = ?message.event_key, "event_click"),
        Some(EventKind::Other(event)) => info!(event = %event, "event_unhandled"),
        None => info!("event_missing_type"),
    }
}
