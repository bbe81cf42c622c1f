use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A timestamp column as the legacy store handed it back.
#[derive(Debug, Clone, PartialEq)]
pub enum RawTimestamp {
    Native(DateTime<Utc>),
    Text(String),
    Missing,
}

/// One `chat_sessions` row before any coercion.
#[derive(Debug, Clone)]
pub struct LegacyChatRow {
    pub id: String,
    pub title: Option<String>,
    pub created_at: RawTimestamp,
    pub updated_at: RawTimestamp,
    pub messages: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LegacyChatSession {
    pub id: String,
    pub title: String,
    pub created_at: String,
    pub updated_at: String,
    pub messages: Vec<LegacyMessage>,
}

/// A stored message, kept exactly as it was written.
///
/// Nothing about its shape is guaranteed, so every accessor returns an
/// `Option` and ignores fields of the wrong type.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(transparent)]
pub struct LegacyMessage(pub Value);

impl LegacyMessage {
    pub fn raw(&self) -> &Value {
        &self.0
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn id(&self) -> Option<&str> {
        self.str_field("id")
    }

    pub fn role(&self) -> Option<&str> {
        self.str_field("role")
    }

    pub fn message(&self) -> Option<&str> {
        self.str_field("message")
    }

    pub fn created_at(&self) -> Option<&str> {
        self.str_field("createdAt")
    }

    pub fn metadata(&self) -> Option<&Map<String, Value>> {
        self.0.get("metadata").and_then(Value::as_object)
    }

    pub fn content(&self) -> LegacyContent {
        match self.0.get("content") {
            None | Some(Value::Null) => LegacyContent::Absent,
            Some(Value::String(text)) => LegacyContent::Text(text.clone()),
            Some(Value::Array(items)) => {
                LegacyContent::Parts(items.iter().map(LegacyPart::from_value).collect())
            }
            Some(other) => LegacyContent::Opaque(other.clone()),
        }
    }

    /// The `parts` sequence, when present and actually a sequence.
    pub fn parts(&self) -> Option<Vec<LegacyPart>> {
        self.0
            .get("parts")
            .and_then(Value::as_array)
            .map(|items| items.iter().map(LegacyPart::from_value).collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LegacyContent {
    Text(String),
    Parts(Vec<LegacyPart>),
    Absent,
    Opaque(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub enum LegacyPart {
    Text {
        text: Option<String>,
    },
    ImageUrl {
        url: Option<String>,
    },
    Unknown {
        kind: Option<String>,
        fields: Map<String, Value>,
    },
}

impl LegacyPart {
    /// Classifies a raw part. A part without a `type` tag is a text part if
    /// it carries `text`, an image part if it carries `image_url` or `url`.
    pub fn from_value(value: &Value) -> Self {
        let Some(fields) = value.as_object() else {
            return match value {
                Value::String(text) => LegacyPart::Text {
                    text: Some(text.clone()),
                },
                _ => LegacyPart::Unknown {
                    kind: None,
                    fields: Map::new(),
                },
            };
        };

        let kind = fields.get("type").and_then(Value::as_str);
        match kind {
            Some("text") => LegacyPart::Text {
                text: string_field(fields, "text"),
            },
            Some("image_url") => LegacyPart::ImageUrl {
                url: image_url(fields),
            },
            None if fields.contains_key("text") => LegacyPart::Text {
                text: string_field(fields, "text"),
            },
            None if fields.contains_key("image_url") || fields.contains_key("url") => {
                LegacyPart::ImageUrl {
                    url: image_url(fields),
                }
            }
            _ => LegacyPart::Unknown {
                kind: kind.map(str::to_string),
                fields: fields.clone(),
            },
        }
    }
}

fn string_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields.get(key).and_then(Value::as_str).map(str::to_string)
}

// `image_url` is either the URL itself or `{ "url": ... }`.
fn image_url(fields: &Map<String, Value>) -> Option<String> {
    let nested = match fields.get("image_url") {
        Some(Value::String(url)) => Some(url.clone()),
        Some(Value::Object(inner)) => string_field(inner, "url"),
        _ => None,
    };
    nested.or_else(|| string_field(fields, "url"))
}
