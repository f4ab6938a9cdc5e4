//! Shared state handed to every OIDC endpoint.

use axum::http::{HeaderMap, header::HOST};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::directory::UserDirectory;
use crate::oidc::codes::CodeRegistry;
use crate::oidc::keys::KeyManager;
use crate::oidc::session::{QueryPrincipal, SessionResolver};

/// Default ID token lifetime in seconds.
pub const DEFAULT_ID_TOKEN_LIFETIME: i64 = 3600;

#[derive(Clone)]
pub struct OidcState {
    keys: Arc<RwLock<Arc<KeyManager>>>,
    pub codes: CodeRegistry,
    pub directory: Arc<dyn UserDirectory>,
    pub session: Arc<dyn SessionResolver>,
    /// Fixed issuer; derived from the Host header when unset
    pub issuer_url: Option<String>,
    /// ID token lifetime in seconds
    pub id_token_lifetime: i64,
}

impl OidcState {
    pub fn new(keys: KeyManager, directory: Arc<dyn UserDirectory>) -> Self {
        Self {
            keys: Arc::new(RwLock::new(Arc::new(keys))),
            codes: CodeRegistry::default(),
            directory,
            session: Arc::new(QueryPrincipal::default()),
            issuer_url: None,
            id_token_lifetime: DEFAULT_ID_TOKEN_LIFETIME,
        }
    }

    pub fn with_issuer_url(mut self, issuer_url: Option<String>) -> Self {
        self.issuer_url = issuer_url.map(|url| url.trim_end_matches('/').to_string());
        self
    }

    pub fn with_code_ttl(mut self, ttl: Duration) -> Self {
        self.codes = CodeRegistry::new(ttl);
        self
    }

    pub fn with_session_resolver(mut self, session: Arc<dyn SessionResolver>) -> Self {
        self.session = session;
        self
    }

    pub fn with_id_token_lifetime(mut self, seconds: i64) -> Self {
        self.id_token_lifetime = seconds;
        self
    }

    /// Snapshot of the current key set. Holders keep the set they got even if
    /// it is replaced meanwhile.
    pub fn keys(&self) -> Arc<KeyManager> {
        self.keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swap in a new key set. Later signatures and JWKS responses use it.
    pub fn replace_keys(&self, keys: KeyManager) {
        tracing::info!(kid = keys.active_kid(), "Replacing signing key set");
        *self.keys.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(keys);
    }

    /// Issuer identifier for a request. Discovery and ID tokens both use this.
    pub fn issuer(&self, headers: &HeaderMap) -> String {
        if let Some(issuer) = &self.issuer_url {
            return issuer.clone();
        }
        let host = headers
            .get(HOST)
            .and_then(|value| value.to_str().ok())
            .filter(|host| !host.is_empty())
            .unwrap_or("localhost");
        format!("http://{host}")
    }
}
