use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use super::{DirectoryError, User, UserDirectory};

/// In-process user directory backed by a [`DashMap`].
///
/// Every mutation goes through the map's entry API, which holds the shard lock
/// across the read-modify-write.
#[derive(Clone, Default)]
pub struct MemoryDirectory {
    users: Arc<DashMap<String, User>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl UserDirectory for MemoryDirectory {
    async fn create(&self, user: User) -> Result<(), DirectoryError> {
        self.users
            .entry(user.id.clone())
            .and_modify(|existing| existing.email = user.email.clone())
            .or_insert(user);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<User>, DirectoryError> {
        Ok(self.users.get(id).map(|entry| entry.value().clone()))
    }

    async fn save_refresh_token(&self, id: &str, token: &str) -> Result<(), DirectoryError> {
        self.users
            .entry(id.to_string())
            .or_insert_with(|| User::new(id, ""))
            .refresh_token = Some(token.to_string());
        Ok(())
    }

    async fn revoke_refresh_token(&self, id: &str) -> Result<(), DirectoryError> {
        let mut user = self
            .users
            .get_mut(id)
            .ok_or_else(|| DirectoryError::NotFound(id.to_string()))?;
        user.refresh_token = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_get() {
        let directory = MemoryDirectory::new();
        directory
            .create(User::new("123", "a@example.com"))
            .await
            .unwrap();

        let user = directory.get("123").await.unwrap().expect("user exists");
        assert_eq!(user.email, "a@example.com");
        assert_eq!(user.refresh_token, None);
        assert!(directory.get("456").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_refresh_token_creates_user() {
        let directory = MemoryDirectory::new();
        directory.save_refresh_token("new", "rt-1").await.unwrap();

        let user = directory.get("new").await.unwrap().expect("created");
        assert_eq!(user.id, "new");
        assert_eq!(user.refresh_token.as_deref(), Some("rt-1"));
    }

    #[tokio::test]
    async fn test_save_refresh_token_overwrites() {
        let directory = MemoryDirectory::new();
        directory.save_refresh_token("123", "rt-1").await.unwrap();
        directory.save_refresh_token("123", "rt-2").await.unwrap();

        let user = directory.get("123").await.unwrap().unwrap();
        assert_eq!(user.refresh_token.as_deref(), Some("rt-2"));
    }

    #[tokio::test]
    async fn test_recreate_keeps_refresh_token() {
        let directory = MemoryDirectory::new();
        directory.save_refresh_token("123", "rt-1").await.unwrap();
        directory
            .create(User::new("123", "a@example.com"))
            .await
            .unwrap();

        let user = directory.get("123").await.unwrap().unwrap();
        assert_eq!(user.email, "a@example.com");
        assert_eq!(user.refresh_token.as_deref(), Some("rt-1"));
    }

    #[tokio::test]
    async fn test_revoke_refresh_token() {
        let directory = MemoryDirectory::new();
        directory.save_refresh_token("123", "rt-1").await.unwrap();
        directory.revoke_refresh_token("123").await.unwrap();
        // revoking twice is fine for a known user
        directory.revoke_refresh_token("123").await.unwrap();

        let user = directory.get("123").await.unwrap().unwrap();
        assert_eq!(user.refresh_token, None);
    }

    #[tokio::test]
    async fn test_revoke_unknown_user_is_not_found() {
        let directory = MemoryDirectory::new();
        let result = directory.revoke_refresh_token("ghost").await;
        assert!(matches!(result, Err(DirectoryError::NotFound(id)) if id == "ghost"));
        assert!(directory.is_empty());
    }
}
