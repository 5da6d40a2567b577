// src/attributes.rs
//! Boundary to the identity registry.
//!
//! The passport producers never talk to the registry directly; they read
//! attribute values through [`AttributeSource`]. The registry adapters live
//! outside this crate. [`InMemoryAttributeSource`] serves standalone
//! deployments and tests from a JSON document:
//!
//! ```json
//! { "users": { "42": {
//!     "attributes": { "urn:...:elixir-persistent": { "value": "alice@elixir-europe.org" } },
//!     "groups": [10432],
//!     "affiliations": { "urn:...:affiliations": [ { "source": "...", "value": "faculty@muni.cz", "asserted": 1600000000 } ] },
//!     "group_affiliations": { "urn:...:groupAffiliations": [] }
//! } } }
//! ```

use crate::error::AttributeSourceError;
use crate::models::attribute::{Affiliation, Attribute};
use async_trait::async_trait;
use serde::{de, Deserialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Read access to user attributes held by the identity registry.
#[async_trait]
pub trait AttributeSource: Send + Sync {
    /// Value of a user attribute, `None` when the attribute is not set.
    async fn user_attribute(&self, user_id: u64, attribute: &str)
        -> Result<Option<Attribute>, AttributeSourceError>;

    /// Whether the user is a valid member of the group.
    async fn is_user_in_group(&self, user_id: u64, group_id: u64) -> Result<bool, AttributeSourceError>;

    /// Affiliations asserted for the user by their identity providers.
    async fn user_affiliations(&self, user_id: u64, attribute: &str)
        -> Result<Vec<Affiliation>, AttributeSourceError>;

    /// Affiliations of the groups the user is a member of.
    async fn group_affiliations(&self, user_id: u64, attribute: &str)
        -> Result<Vec<Affiliation>, AttributeSourceError>;
}

/// Registry data of a single user.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct UserRecord {
    #[serde(default)]
    pub attributes: HashMap<String, Attribute>,
    #[serde(default)]
    pub groups: HashSet<u64>,
    #[serde(default)]
    pub affiliations: HashMap<String, Vec<Affiliation>>,
    #[serde(default)]
    pub group_affiliations: HashMap<String, Vec<Affiliation>>,
}

#[derive(Deserialize, Debug, Default)]
struct AttributeDocument {
    #[serde(default)]
    users: HashMap<u64, UserRecord>,
}

/// Attribute source backed by an immutable in-memory map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAttributeSource {
    users: HashMap<u64, UserRecord>,
}

impl InMemoryAttributeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads users from a JSON document on disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AttributeSourceError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parses users from a JSON document.
    ///
    /// The document must be a JSON object; any other top-level value is
    /// rejected instead of being read as an empty store.
    pub fn from_json(json: &str) -> Result<Self, AttributeSourceError> {
        let document: Value = serde_json::from_str(json)?;
        if !document.is_object() {
            return Err(AttributeSourceError::Json(de::Error::custom(
                "attribute store must be a JSON object with a users member",
            )));
        }
        let document: AttributeDocument = serde_json::from_value(document)?;
        Ok(Self { users: document.users })
    }

    /// Adds or replaces a user.
    pub fn with_user(mut self, user_id: u64, record: UserRecord) -> Self {
        self.users.insert(user_id, record);
        self
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }
}

#[async_trait]
impl AttributeSource for InMemoryAttributeSource {
    async fn user_attribute(
        &self,
        user_id: u64,
        attribute: &str,
    ) -> Result<Option<Attribute>, AttributeSourceError> {
        Ok(self
            .users
            .get(&user_id)
            .and_then(|user| user.attributes.get(attribute))
            .cloned())
    }

    async fn is_user_in_group(&self, user_id: u64, group_id: u64) -> Result<bool, AttributeSourceError> {
        Ok(self
            .users
            .get(&user_id)
            .map(|user| user.groups.contains(&group_id))
            .unwrap_or(false))
    }

    async fn user_affiliations(
        &self,
        user_id: u64,
        attribute: &str,
    ) -> Result<Vec<Affiliation>, AttributeSourceError> {
        Ok(self
            .users
            .get(&user_id)
            .and_then(|user| user.affiliations.get(attribute))
            .cloned()
            .unwrap_or_default())
    }

    async fn group_affiliations(
        &self,
        user_id: u64,
        attribute: &str,
    ) -> Result<Vec<Affiliation>, AttributeSourceError> {
        Ok(self
            .users
            .get(&user_id)
            .and_then(|user| user.group_affiliations.get(attribute))
            .cloned()
            .unwrap_or_default())
    }
}
