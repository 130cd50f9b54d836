//! Card (Metabase question) document.
//!
//! A card is owned by the remote service and its schema changes between
//! Metabase releases, so it is kept as an untyped JSON object. Only the
//! handful of fields the sync engine reads or writes get named accessors;
//! everything else is carried through untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Remote card identifier.
pub type CardId = u64;

/// Maximum length of the title part of a pulled file name.
const MAX_TITLE_CHARS: usize = 256;

/// A card as returned by `GET /api/card/:id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Card {
    fields: Map<String, Value>,
}

impl Card {
    /// Convert a JSON value into a card. Returns `None` for non-objects.
    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self { fields }),
            _ => None,
        }
    }

    /// Parse a card document from text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a JSON object.
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Remote id, if the document carries one.
    #[must_use]
    pub fn id(&self) -> Option<CardId> {
        self.fields.get("id").and_then(Value::as_u64)
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.fields.get("name").and_then(Value::as_str)
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.fields.get("description").and_then(Value::as_str)
    }

    /// The SQL/template body at `dataset_query.native.query`.
    #[must_use]
    pub fn native_query(&self) -> Option<&str> {
        self.native()
            .and_then(|native| native.get("query"))
            .and_then(Value::as_str)
    }

    /// Replace `dataset_query.native.query`.
    ///
    /// Returns `false` and leaves the card untouched when it has no native
    /// query section.
    pub fn set_native_query(&mut self, query: impl Into<String>) -> bool {
        let Some(native) = self
            .fields
            .get_mut("dataset_query")
            .and_then(Value::as_object_mut)
            .and_then(|dataset_query| dataset_query.get_mut("native"))
            .and_then(Value::as_object_mut)
        else {
            return false;
        };
        native.insert("query".to_string(), Value::String(query.into()));
        true
    }

    /// Top-level field lookup.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Display label for reports and log lines.
    #[must_use]
    pub fn label(&self) -> &str {
        self.name().unwrap_or("<unnamed>")
    }

    /// File name a pulled card is written to: `"{id} - {title}.json"`.
    ///
    /// The title keeps alphanumerics, spaces, `.`, `_` and `-`, is
    /// right-trimmed and capped at 256 characters.
    #[must_use]
    pub fn file_name(&self, id: CardId) -> String {
        let title: String = self
            .label()
            .chars()
            .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '.' | '_' | '-'))
            .collect();
        let title: String = title.trim_end().chars().take(MAX_TITLE_CHARS).collect();
        format!("{id} - {}.json", title.trim_end())
    }

    /// Serialize the way files are stored on disk: sorted keys, 4-space
    /// indent, trailing newline.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_pretty_json(&self) -> serde_json::Result<String> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut serializer)?;
        buf.push(b'\n');
        // serde_json only ever emits UTF-8.
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Consume the card, returning the underlying JSON value.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }

    fn native(&self) -> Option<&Map<String, Value>> {
        self.fields
            .get("dataset_query")
            .and_then(Value::as_object)
            .and_then(|dataset_query| dataset_query.get("native"))
            .and_then(Value::as_object)
    }
}
