//! A minimal OpenID Connect identity provider.
//!
//! Issues single-use authorization codes to principals authenticated upstream,
//! exchanges them for RS256-signed ID tokens plus opaque access and refresh
//! tokens, publishes its signing keys, and revokes refresh tokens on logout.
//! Users live in a [`directory::UserDirectory`], optionally populated from LDAP.

use std::sync::Arc;

use crate::config::{AppConfig, ConfigError};
use crate::directory::UserDirectory;
use crate::oidc::keys::{KeyError, KeyManager, SigningKey};
use crate::oidc::OidcState;

pub mod api;
pub mod config;
pub mod directory;
pub mod error;
pub mod oidc;

/// Load the configured signing key, or generate one when none is configured.
pub fn load_signing_keys(config: &AppConfig) -> Result<KeyManager, KeyError> {
    let key = match &config.signing_key_path {
        Some(path) => SigningKey::from_pem_file(path)?,
        None => {
            tracing::warn!("No signing_key_path configured, generating an ephemeral signing key");
            SigningKey::generate()?
        }
    };
    tracing::info!(kid = key.kid(), "Loaded signing key");
    Ok(KeyManager::new(key))
}

/// Assemble the shared endpoint state from configuration.
pub fn build_state(
    config: &AppConfig,
    keys: KeyManager,
    directory: Arc<dyn UserDirectory>,
) -> Result<OidcState, ConfigError> {
    Ok(OidcState::new(keys, directory)
        .with_issuer_url(config.issuer_url.clone())
        .with_code_ttl(config.code_ttl())
        .with_id_token_lifetime(config.id_token_lifetime_secs)
        .with_session_resolver(config.session_resolver()?))
}
