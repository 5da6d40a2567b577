// src/models/attribute.rs
//! Attribute values delivered by the identity registry.

use serde::{Deserialize, Serialize};

/// Value of a registry attribute.
///
/// Only the shapes the passport producers read are modelled.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum AttributeValue {
    String(String),
    Array(Vec<String>),
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            AttributeValue::Array(_) => None,
        }
    }
}

/// A registry attribute with its optional value creation time.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub value: AttributeValue,

    /// Seconds since the Unix epoch at which the value was recorded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
}

/// An affiliation of a user or of one of their groups.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Affiliation {
    /// Where the affiliation was asserted (identity provider or organisation URL)
    pub source: String,

    /// Scoped affiliation, e.g. `faculty@example.org`
    pub value: String,

    /// Seconds since the Unix epoch
    pub asserted: i64,
}
