//! User identities and the directory lookup seam.
//!
//! The worker does not own user records; it resolves them through the
//! [`IdentityDirectory`] trait. The hosting process wires in whatever
//! backend it has (the application database in production,
//! [`StaticDirectory`] in the CLI and tests).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::IdentityError;

/// Role of an identity within the application under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityRole {
    /// Ordinary account holder
    Member,
    /// Designated verifier account the render is performed as
    Verifier,
}

/// An opaque user record: a unique identifier plus display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Unique user identifier (the application's 10-character ID)
    pub user_id: String,
    /// Display name
    pub username: String,
    /// Account role
    pub role: IdentityRole,
}

impl Identity {
    /// Create a member identity.
    #[must_use]
    pub fn member(user_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            role: IdentityRole::Member,
        }
    }

    /// Create a verifier identity.
    #[must_use]
    pub fn verifier(user_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            role: IdentityRole::Verifier,
        }
    }
}

/// Resolves user identifiers to full records.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// Resolve a user identifier to its full record.
    async fn find(&self, user_id: &str) -> Result<Option<Identity>, IdentityError>;

    /// Return the designated verifier identity renders are performed as.
    async fn find_verifier(&self) -> Result<Option<Identity>, IdentityError>;
}

/// In-memory directory for the CLI and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    identities: Vec<Identity>,
}

impl StaticDirectory {
    /// Build a directory from a fixed set of identities.
    #[must_use]
    pub fn new(identities: Vec<Identity>) -> Self {
        Self { identities }
    }

    /// Add an identity.
    pub fn insert(&mut self, identity: Identity) {
        self.identities.push(identity);
    }
}

#[async_trait]
impl IdentityDirectory for StaticDirectory {
    async fn find(&self, user_id: &str) -> Result<Option<Identity>, IdentityError> {
        Ok(self
            .identities
            .iter()
            .find(|i| i.user_id == user_id)
            .cloned())
    }

    async fn find_verifier(&self) -> Result<Option<Identity>, IdentityError> {
        Ok(self
            .identities
            .iter()
            .find(|i| i.role == IdentityRole::Verifier)
            .cloned())
    }
}
