//! Request body capture for the log feed.

use serde::{Serialize, Serializer};
use thiserror::Error;

/// Longest text body kept in a log entry, in characters.
pub const MAX_LOGGED_BODY_CHARS: usize = 200;

const BINARY_MARKER: &str = "(Binary or Unreadable Body)";
const EMPTY_MARKER: &str = "(No Body)";
const OTHER_TEXT_PREFIX: &str = "(Non-JSON/Text Body, truncated): ";

/// What a request body looked like, as far as the log feed is concerned.
#[derive(Debug, Clone, PartialEq)]
pub enum LoggedBody {
    Json(serde_json::Value),
    Text(String),
    Binary,
    Empty,
}

impl LoggedBody {
    /// Single-line rendering used by the operator trace.
    pub fn render(&self) -> String {
        match self {
            Self::Json(value) => value.to_string(),
            Self::Text(text) => text.clone(),
            Self::Binary => BINARY_MARKER.to_string(),
            Self::Empty => EMPTY_MARKER.to_string(),
        }
    }
}

impl Serialize for LoggedBody {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Json(value) => value.serialize(serializer),
            Self::Text(text) => serializer.serialize_str(text),
            Self::Binary => serializer.serialize_str(BINARY_MARKER),
            Self::Empty => serializer.serialize_str(EMPTY_MARKER),
        }
    }
}

#[derive(Debug, Error)]
pub enum BodyError {
    #[error("Failed to parse body: {0}")]
    Json(#[from] serde_json::Error),
}

/// Media type of a `Content-Type` value, without parameters, lowercased.
pub fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Cuts `text` to `limit` characters, appending `...` when something was cut.
pub fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Classifies a request body by its declared content type.
///
/// Only malformed JSON is an error. Undecodable payloads of other types are
/// recorded with a marker instead.
pub fn parse_body(
    content_type: Option<&str>,
    body: Option<&[u8]>,
) -> Result<LoggedBody, BodyError> {
    let declared = content_type.map(media_type);
    let body = body.filter(|bytes| !bytes.is_empty());

    match (declared.as_deref(), body) {
        (Some("application/json"), Some(bytes)) => {
            Ok(LoggedBody::Json(serde_json::from_slice(bytes)?))
        }
        (Some("application/json"), None) => {
            // an empty JSON document is still a parse failure
            Ok(LoggedBody::Json(serde_json::from_slice(&[])?))
        }
        (Some("application/x-www-form-urlencoded" | "text/plain"), bytes) => {
            let text = bytes.map(String::from_utf8_lossy).unwrap_or_default();
            Ok(LoggedBody::Text(truncate_chars(&text, MAX_LOGGED_BODY_CHARS)))
        }
        (_, Some(bytes)) => match std::str::from_utf8(bytes) {
            Ok(text) => Ok(LoggedBody::Text(format!(
                "{OTHER_TEXT_PREFIX}{}",
                truncate_chars(text, MAX_LOGGED_BODY_CHARS)
            ))),
            Err(_) => Ok(LoggedBody::Binary),
        },
        (_, None) => Ok(LoggedBody::Empty),
    }
}
