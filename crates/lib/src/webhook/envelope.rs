//! Webhook envelope: `{ destination, events: [...] }` as POSTed by the LINE platform.
//!
//! Fields are all optional on the wire so a partially broken event can still drive a reply;
//! what is missing is reported through [`EnvelopeError`].

use crate::channels::InboundMessage;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

/// Read a field as `Some` only when it has the expected type; anything else becomes `None`.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Outer envelope. Events stay raw so a broken later event cannot spoil the first.
#[derive(Debug, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(default, deserialize_with = "lenient")]
    pub destination: Option<String>,
    #[serde(default)]
    pub events: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    #[serde(rename = "type", default, deserialize_with = "lenient")]
    pub typ: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub reply_token: Option<String>,
    /// Milliseconds since the Unix epoch.
    #[serde(default, deserialize_with = "lenient")]
    pub timestamp: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    pub source: Option<EventSource>,
    #[serde(default, deserialize_with = "lenient")]
    pub message: Option<EventMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSource {
    #[serde(rename = "type", default, deserialize_with = "lenient")]
    pub typ: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub group_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub room_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EventMessage {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<String>,
    #[serde(rename = "type", default, deserialize_with = "lenient")]
    pub typ: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub text: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("body is not a webhook envelope: {0}")]
    Json(#[from] serde_json::Error),
    #[error("missing field: {0}")]
    MissingField(&'static str),
    #[error("timestamp out of range: {0}")]
    InvalidTimestamp(i64),
}

/// A text event taken from the envelope.
///
/// `message` is `Err` when the text and reply token were recovered but the record fields
/// (sender, timestamp) were not; the reply decision can still run in that case.
#[derive(Debug)]
pub struct InboundEvent {
    pub text: String,
    pub reply_token: Option<String>,
    pub message: Result<InboundMessage, EnvelopeError>,
}

impl WebhookEvent {
    fn conversation_id(&self) -> String {
        self.source
            .as_ref()
            .and_then(|s| s.group_id.clone().or_else(|| s.room_id.clone()))
            .unwrap_or_default()
    }

    fn inbound_message(&self, text: &str) -> Result<InboundMessage, EnvelopeError> {
        let sender_id = self
            .source
            .as_ref()
            .and_then(|s| s.user_id.clone())
            .filter(|id| !id.is_empty())
            .ok_or(EnvelopeError::MissingField("events[0].source.userId"))?;
        let ms = self
            .timestamp
            .ok_or(EnvelopeError::MissingField("events[0].timestamp"))?;
        let timestamp_utc =
            DateTime::<Utc>::from_timestamp_millis(ms).ok_or(EnvelopeError::InvalidTimestamp(ms))?;
        Ok(InboundMessage {
            sender_id,
            text: text.to_string(),
            timestamp_utc,
            conversation_id: self.conversation_id(),
        })
    }
}

/// Take the first event of the body if it is a non-empty text message.
///
/// `Ok(None)`: nothing to do (no events, a non-message event, a non-text message, or empty text).
/// `Err`: the body or the text itself could not be recovered. Events after the first are not
/// inspected, and a mistyped record field only marks `message` as `Err`.
pub fn first_text_event(body: &[u8]) -> Result<Option<InboundEvent>, EnvelopeError> {
    let envelope: WebhookEnvelope = serde_json::from_slice(body)?;
    let events = envelope
        .events
        .ok_or(EnvelopeError::MissingField("events"))?;
    let Some(first) = events.into_iter().next() else {
        return Ok(None);
    };
    let event: WebhookEvent = serde_json::from_value(first)?;
    if event.typ.as_deref().is_some_and(|t| t != "message") {
        return Ok(None);
    }
    let message = event
        .message
        .as_ref()
        .ok_or(EnvelopeError::MissingField("events[0].message"))?;
    if message.typ.as_deref() != Some("text") {
        return Ok(None);
    }
    let text = message
        .text
        .clone()
        .ok_or(EnvelopeError::MissingField("events[0].message.text"))?;
    if text.is_empty() {
        return Ok(None);
    }
    let record = event.inbound_message(&text);
    Ok(Some(InboundEvent {
        text,
        reply_token: event.reply_token.clone(),
        message: record,
    }))
}
