//! LDAP import into the user directory.
//!
//! Runs off the request path, either once at startup or on an interval. A
//! failed run is logged and the directory keeps whatever it already held.

use ldap3::{LdapConnAsync, Scope, SearchEntry};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

use super::{User, UserDirectory};

const SEARCH_ATTRIBUTES: [&str; 2] = ["uid", "mail"];

#[derive(Clone, Debug, Deserialize)]
pub struct LdapSyncConfig {
    pub url: String,
    /// Empty means an anonymous search without a bind
    #[serde(default)]
    pub bind_dn: String,
    #[serde(default)]
    pub password: String,
    pub base_dn: String,
    #[serde(default = "default_filter")]
    pub filter: String,
    /// Repeat the sync on this interval; run once when absent
    #[serde(default)]
    pub sync_interval_secs: Option<u64>,
}

fn default_filter() -> String {
    "(objectClass=person)".to_string()
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Failed to connect to LDAP server: {0}")]
    Connect(#[source] ldap3::LdapError),
    #[error("LDAP bind failed: {0}")]
    Bind(#[source] ldap3::LdapError),
    #[error("LDAP search failed: {0}")]
    Search(#[source] ldap3::LdapError),
}

/// Map a search entry to a user. Entries without a `uid` are skipped.
fn user_from_entry(entry: SearchEntry) -> Option<User> {
    let first = |name: &str| {
        entry
            .attrs
            .get(name)
            .and_then(|values| values.first())
            .cloned()
    };
    let id = first("uid").filter(|uid| !uid.is_empty())?;
    Some(User::new(id, first("mail").unwrap_or_default()))
}

/// Run one import pass, returning the number of users upserted.
#[tracing::instrument(skip(config, directory), fields(url = %config.url, base_dn = %config.base_dn))]
pub async fn sync_directory(
    config: &LdapSyncConfig,
    directory: &dyn UserDirectory,
) -> Result<usize, SyncError> {
    let (conn, mut ldap) = LdapConnAsync::new(&config.url)
        .await
        .map_err(SyncError::Connect)?;
    tokio::spawn(async move {
        if let Err(e) = conn.drive().await {
            tracing::warn!(error = %e, "LDAP connection error");
        }
    });

    if !config.bind_dn.is_empty() {
        ldap.simple_bind(&config.bind_dn, &config.password)
            .await
            .and_then(|res| res.success())
            .map_err(SyncError::Bind)?;
    }

    let (entries, _) = ldap
        .search(
            &config.base_dn,
            Scope::Subtree,
            &config.filter,
            SEARCH_ATTRIBUTES.to_vec(),
        )
        .await
        .and_then(|res| res.success())
        .map_err(SyncError::Search)?;

    let mut imported = 0;
    for entry in entries {
        let Some(user) = user_from_entry(SearchEntry::construct(entry)) else {
            tracing::debug!("Skipping LDAP entry without uid");
            continue;
        };
        match directory.create(user).await {
            Ok(()) => imported += 1,
            Err(e) => tracing::warn!(error = %e, "Failed to store synced user"),
        }
    }

    if let Err(e) = ldap.unbind().await {
        tracing::debug!(error = %e, "LDAP unbind failed");
    }
    Ok(imported)
}

/// Spawn the directory sync in the background.
pub fn spawn_directory_sync(
    config: LdapSyncConfig,
    directory: Arc<dyn UserDirectory>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match config.sync_interval_secs.filter(|secs| *secs > 0) {
            Some(secs) => {
                let mut interval = tokio::time::interval(Duration::from_secs(secs));
                loop {
                    interval.tick().await;
                    run_sync(&config, directory.as_ref()).await;
                }
            }
            None => run_sync(&config, directory.as_ref()).await,
        }
    })
}

async fn run_sync(config: &LdapSyncConfig, directory: &dyn UserDirectory) {
    match sync_directory(config, directory).await {
        Ok(count) => tracing::info!(count, "Directory sync finished"),
        Err(e) => tracing::error!(error = %e, "Directory sync failed, serving existing directory"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::MemoryDirectory;
    use std::collections::HashMap;

    fn entry(attrs: &[(&str, &str)]) -> SearchEntry {
        SearchEntry {
            dn: "uid=x,dc=example,dc=org".to_string(),
            attrs: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), vec![v.to_string()]))
                .collect::<HashMap<_, _>>(),
            bin_attrs: HashMap::new(),
        }
    }

    fn config(url: &str) -> LdapSyncConfig {
        LdapSyncConfig {
            url: url.to_string(),
            bind_dn: String::new(),
            password: String::new(),
            base_dn: "dc=example,dc=org".to_string(),
            filter: default_filter(),
            sync_interval_secs: None,
        }
    }

    #[test]
    fn test_user_from_entry() {
        let user = user_from_entry(entry(&[("uid", "alice"), ("mail", "alice@example.org")]))
            .expect("has uid");
        assert_eq!(user, User::new("alice", "alice@example.org"));

        let no_mail = user_from_entry(entry(&[("uid", "bob")])).expect("has uid");
        assert_eq!(no_mail.email, "");

        assert!(user_from_entry(entry(&[("mail", "nobody@example.org")])).is_none());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_connect_error() {
        let directory = MemoryDirectory::new();
        let result = sync_directory(&config("ldap://127.0.0.1:1"), &directory).await;

        assert!(matches!(result, Err(SyncError::Connect(_))));
        assert!(directory.is_empty());
    }

    #[tokio::test]
    async fn test_failed_sync_keeps_existing_users() {
        let directory = MemoryDirectory::new();
        directory
            .create(User::new("123", "a@example.com"))
            .await
            .unwrap();

        let shared: Arc<dyn UserDirectory> = Arc::new(directory.clone());
        spawn_directory_sync(config("ldap://127.0.0.1:1"), shared)
            .await
            .expect("sync task must not panic");

        assert!(directory.get("123").await.unwrap().is_some());
    }
}
