use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{InboxError, Result};

/// A raw message as the gateway reports it. Only `type == "text"` records
/// carry anything the inbox shows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MessageRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub text: Option<TextContent>,
    #[serde(default)]
    pub timestamp: Option<Value>,
}

/// The gateway nests the payload as `{ "body": ... }`; the backend's own
/// store keeps a bare string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TextContent {
    Structured {
        #[serde(default)]
        body: Option<String>,
    },
    Plain(String),
}

impl MessageRecord {
    pub fn is_text(&self) -> bool {
        self.kind.as_deref() == Some("text")
    }

    /// The text payload, if present and non-empty.
    pub fn body(&self) -> Option<&str> {
        let body = match self.text.as_ref()? {
            TextContent::Structured { body } => body.as_deref()?,
            TextContent::Plain(body) => body.as_str(),
        };
        if body.is_empty() { None } else { Some(body) }
    }

    /// The address on the other side of the conversation: `from` when the
    /// record was received, `to` when it was sent from this account.
    pub fn counterpart(&self) -> Option<&str> {
        non_empty(self.from.as_deref()).or_else(|| non_empty(self.to.as_deref()))
    }

    pub fn timestamp(&self) -> Result<DateTime<Utc>> {
        match &self.timestamp {
            Some(value) => parse_timestamp(value),
            None => Err(InboxError::MalformedData(format!(
                "message {} has no timestamp",
                self.id.as_deref().unwrap_or("<no id>")
            ))),
        }
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.is_empty())
}

/// Accepts RFC 3339, a naive ISO-8601 date-time (local time), or unix
/// seconds as a JSON number or numeric string. Fractional seconds are
/// truncated.
pub fn parse_timestamp(value: &Value) -> Result<DateTime<Utc>> {
    match value {
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(secs), _) => from_unix_seconds(secs),
            (None, Some(secs)) => from_fractional_seconds(secs),
            (None, None) => Err(InboxError::MalformedData(format!("invalid timestamp {n}"))),
        },
        Value::String(s) => parse_timestamp_str(s.trim()),
        other => Err(InboxError::MalformedData(format!(
            "timestamp must be a string or number, got {other}"
        ))),
    }
}

fn parse_timestamp_str(s: &str) -> Result<DateTime<Utc>> {
    if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
        let secs = s
            .parse::<i64>()
            .map_err(|e| InboxError::MalformedData(format!("invalid timestamp {s:?}: {e}")))?;
        return from_unix_seconds(secs);
    }
    if let Some((whole, frac)) = s.split_once('.') {
        let numeric = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
        if numeric(whole) && numeric(frac) {
            let secs = s
                .parse::<f64>()
                .map_err(|e| InboxError::MalformedData(format!("invalid timestamp {s:?}: {e}")))?;
            return from_fractional_seconds(secs);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .map_err(|e| InboxError::MalformedData(format!("invalid timestamp {s:?}: {e}")))?;
    match Local.from_local_datetime(&naive).earliest() {
        Some(local) => Ok(local.with_timezone(&Utc)),
        None => {
            log::debug!("timestamp {s:?} falls in a local DST gap, reading it as UTC");
            Ok(Utc.from_utc_datetime(&naive))
        }
    }
}

fn from_unix_seconds(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| InboxError::MalformedData(format!("timestamp {secs} out of range")))
}

fn from_fractional_seconds(secs: f64) -> Result<DateTime<Utc>> {
    if !secs.is_finite() {
        return Err(InboxError::MalformedData(format!("invalid timestamp {secs}")));
    }
    // `as` saturates; anything that large is rejected as out of range below.
    from_unix_seconds(secs.trunc() as i64)
}

/// Body of `GET /test-messages`. Every level is optional; a missing level
/// means there is nothing to show.
#[derive(Debug, Deserialize, Default)]
pub struct MessagesEnvelope {
    #[serde(default)]
    pub messages_data: Option<MessagesData>,
}

#[derive(Debug, Deserialize, Default)]
pub struct MessagesData {
    #[serde(default)]
    pub messages: Option<Vec<Value>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SendRequest {
    pub phone_number: String,
    pub message: String,
}

/// Error body of a refused `POST /send-message`.
#[derive(Debug, Deserialize, Default)]
pub struct SendErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl SendErrorBody {
    pub fn description(self) -> Option<String> {
        self.message.or(self.error).filter(|s| !s.is_empty())
    }
}
