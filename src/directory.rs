//! Property and user lookups.
//!
//! Listings and accounts are owned by the surrounding platform; the engine
//! only reads them through [`Directory`].

use std::path::Path;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;

use crate::model::{Property, PropertyId, UserId, UserProfile};

#[derive(Debug)]
pub struct LookupError(pub String);

impl std::fmt::Display for LookupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "lookup failed: {}", self.0)
    }
}

impl std::error::Error for LookupError {}

#[async_trait]
pub trait Directory: Send + Sync {
    async fn property(&self, id: PropertyId) -> Result<Option<Property>, LookupError>;
    async fn user(&self, id: UserId) -> Result<Option<UserProfile>, LookupError>;
}

/// Seed file layout: `{"properties": [...], "users": [...]}`.
#[derive(Debug, Default, Deserialize)]
struct Seed {
    #[serde(default)]
    properties: Vec<Property>,
    #[serde(default)]
    users: Vec<UserProfile>,
}

#[derive(Default)]
pub struct InMemoryDirectory {
    properties: DashMap<PropertyId, Property>,
    users: DashMap<UserId, UserProfile>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, LookupError> {
        let seed: Seed =
            serde_json::from_str(json).map_err(|e| LookupError(format!("bad directory seed: {e}")))?;
        let dir = Self::new();
        for p in seed.properties {
            dir.put_property(p);
        }
        for u in seed.users {
            dir.put_user(u);
        }
        Ok(dir)
    }

    pub fn load(path: &Path) -> Result<Self, LookupError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| LookupError(format!("{}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    pub fn put_property(&self, property: Property) {
        self.properties.insert(property.id, property);
    }

    pub fn put_user(&self, user: UserProfile) {
        self.users.insert(user.id, user);
    }

    pub fn property_count(&self) -> usize {
        self.properties.len()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn property(&self, id: PropertyId) -> Result<Option<Property>, LookupError> {
        Ok(self.properties.get(&id).map(|e| e.value().clone()))
    }

    async fn user(&self, id: UserId) -> Result<Option<UserProfile>, LookupError> {
        Ok(self.users.get(&id).map(|e| e.value().clone()))
    }
}
