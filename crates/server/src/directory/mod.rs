//! User directory.
//!
//! The OIDC core only needs four operations on users, captured by
//! [`UserDirectory`]. Storage is up to the implementation; this crate ships
//! [`MemoryDirectory`] and populates it from LDAP through [`sync`].
//!
//! Contract every implementation must honour:
//! - `save_refresh_token` for an unknown id creates a minimal user record.
//! - `revoke_refresh_token` for an unknown id fails with [`DirectoryError::NotFound`].
//! - Each user holds at most one refresh token; saving a new one replaces the old.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod memory;
pub mod sync;

pub use memory::MemoryDirectory;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Stable principal identifier, the `sub` of issued tokens
    pub id: String,
    pub email: String,
    pub refresh_token: Option<String>,
}

impl User {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            refresh_token: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("User not found: {0}")]
    NotFound(String),
    #[error("Directory backend unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Insert or replace a user. A replaced user keeps its live refresh token.
    async fn create(&self, user: User) -> Result<(), DirectoryError>;

    async fn get(&self, id: &str) -> Result<Option<User>, DirectoryError>;

    async fn save_refresh_token(&self, id: &str, token: &str) -> Result<(), DirectoryError>;

    async fn revoke_refresh_token(&self, id: &str) -> Result<(), DirectoryError>;
}
