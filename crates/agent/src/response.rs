//! The structured reply the model must produce.
//!
//! Wire shape:
//!
//! ```json
//! { "contentType": "Text" | "AdaptiveCard", "content": "<string>" }
//! ```
//!
//! Decoding is strict about the discriminator and lenient about everything
//! else: unknown fields are ignored and a missing `content` reads as `""`.

use crate::error::DecodeError;
use serde::{Serialize, Serializer};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    Text,
    AdaptiveCard,
}

/// Wire names, matched case-sensitively in both directions.
const WIRE_NAMES: [(ContentType, &str); 2] = [
    (ContentType::Text, "Text"),
    (ContentType::AdaptiveCard, "AdaptiveCard"),
];

impl ContentType {
    pub fn wire_name(self) -> &'static str {
        WIRE_NAMES
            .iter()
            .find(|(ct, _)| *ct == self)
            .map(|(_, name)| *name)
            .unwrap_or_default()
    }

    pub fn from_wire(name: &str) -> Option<Self> {
        WIRE_NAMES
            .iter()
            .find(|(_, wire)| *wire == name)
            .map(|(ct, _)| *ct)
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl Serialize for ContentType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.wire_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredResponse {
    pub content_type: ContentType,
    pub content: String,
}

impl StructuredResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content_type: ContentType::Text,
            content: content.into(),
        }
    }
}

/// Decode the model's final text.
pub fn parse(text: &str) -> Result<StructuredResponse, DecodeError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| DecodeError::new(e.to_string()))?;

    let fields = match value {
        Value::Object(fields) => fields,
        other => {
            return Err(DecodeError::new(format!(
                "expected a JSON object, found {}",
                kind(&other)
            )));
        }
    };

    let content_type = match fields.get("contentType") {
        None => return Err(DecodeError::new("missing field `contentType`")),
        Some(Value::String(name)) => ContentType::from_wire(name).ok_or_else(|| {
            DecodeError::new(format!(
                "unknown contentType `{name}`, expected `Text` or `AdaptiveCard`"
            ))
        })?,
        Some(other) => {
            return Err(DecodeError::new(format!(
                "`contentType` must be a string, found {}",
                kind(other)
            )));
        }
    };

    let content = match fields.get("content") {
        None => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => {
            return Err(DecodeError::new(format!(
                "`content` must be a string, found {}",
                kind(other)
            )));
        }
    };

    Ok(StructuredResponse {
        content_type,
        content,
    })
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
