use axum::http::HeaderName;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::directory::sync::LdapSyncConfig;
use crate::oidc::session::{HeaderPrincipal, QueryPrincipal, SessionResolver};

/// Upper bound for `code_ttl_secs`.
pub const MAX_CODE_TTL_SECS: u64 = 600;
/// Upper bound for `id_token_lifetime_secs` (one week).
pub const MAX_ID_TOKEN_LIFETIME_SECS: i64 = 7 * 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionSource {
    #[default]
    Query,
    Header,
}

/// Where the authenticated principal is read from.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub source: SessionSource,
    /// Query parameter or header name
    pub name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            source: SessionSource::Query,
            name: "principal".to_string(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    /// Fixed issuer. When unset the issuer is `http://` plus the request Host.
    pub issuer_url: Option<String>,
    pub code_ttl_secs: u64,
    pub id_token_lifetime_secs: i64,
    /// PKCS#8 PEM RSA private key. A key is generated at startup when unset.
    pub signing_key_path: Option<PathBuf>,
    pub session: SessionConfig,
    pub ldap: Option<LdapSyncConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            issuer_url: None,
            code_ttl_secs: 300,
            id_token_lifetime_secs: 3600,
            signing_key_path: None,
            session: SessionConfig::default(),
            ldap: None,
        }
    }
}

impl AppConfig {
    /// Parse a YAML document on top of the defaults, without environment overrides.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        use config::{Config, File, FileFormat};
        let cfg = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?;
        let app: AppConfig = cfg.try_deserialize()?;
        app.validate()?;
        Ok(app)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_CODE_TTL_SECS).contains(&self.code_ttl_secs) {
            return Err(ConfigError::Validation(format!(
                "code_ttl_secs must be between 1 and {MAX_CODE_TTL_SECS}"
            )));
        }
        if !(1..=MAX_ID_TOKEN_LIFETIME_SECS).contains(&self.id_token_lifetime_secs) {
            return Err(ConfigError::Validation(format!(
                "id_token_lifetime_secs must be between 1 and {MAX_ID_TOKEN_LIFETIME_SECS}"
            )));
        }
        if let Some(issuer) = &self.issuer_url {
            url::Url::parse(issuer).map_err(|e| {
                ConfigError::Validation(format!("issuer_url is not a valid URL: {e}"))
            })?;
        }
        if self.session.name.is_empty() {
            return Err(ConfigError::Validation("session.name must not be empty".into()));
        }
        if self.session.source == SessionSource::Header {
            HeaderName::from_bytes(self.session.name.as_bytes()).map_err(|_| {
                ConfigError::Validation(format!(
                    "session.name '{}' is not a valid header name",
                    self.session.name
                ))
            })?;
        }
        if let Some(ldap) = &self.ldap
            && (ldap.url.is_empty() || ldap.base_dn.is_empty())
        {
            return Err(ConfigError::Validation(
                "ldap.url and ldap.base_dn are required when ldap is configured".into(),
            ));
        }
        Ok(())
    }

    pub fn code_ttl(&self) -> Duration {
        Duration::from_secs(self.code_ttl_secs)
    }

    /// Build the session resolver selected by `session.source`.
    pub fn session_resolver(&self) -> Result<Arc<dyn SessionResolver>, ConfigError> {
        let resolver: Arc<dyn SessionResolver> = match self.session.source {
            SessionSource::Query => Arc::new(QueryPrincipal::new(self.session.name.clone())),
            SessionSource::Header => {
                let header = HeaderName::from_bytes(self.session.name.as_bytes()).map_err(|_| {
                    ConfigError::Validation(format!(
                        "session.name '{}' is not a valid header name",
                        self.session.name
                    ))
                })?;
                Arc::new(HeaderPrincipal::new(header))
            }
        };
        Ok(resolver)
    }
}

/// Load application configuration from `config.yaml` + environment overrides.
///
/// The file is optional. Environment variables prefixed `IDP_` override it,
/// with nested keys separated by double underscores (e.g. `IDP_LDAP__URL`,
/// `IDP_SESSION__SOURCE`).
///
/// Returns a `ConfigError` instead of panicking so the caller can decide how to fail.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    use config::{Config, Environment, File};
    let cfg = Config::builder()
        .add_source(File::with_name("config.yaml").required(false))
        .add_source(
            Environment::with_prefix("IDP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    let app: AppConfig = cfg.try_deserialize()?;
    app.validate()?;
    Ok(app)
}

/// Convenience helper for binaries wanting panic-on-error behaviour.
pub fn load_config_or_panic() -> AppConfig {
    match load_config() {
        Ok(c) => c,
        Err(e) => panic!("Failed to load configuration: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.listen_addr.port(), 8080);
        assert_eq!(config.code_ttl(), Duration::from_secs(300));
        assert_eq!(config.session.source, SessionSource::Query);
        assert_eq!(config.session.name, "principal");
    }

    #[test]
    fn code_ttl_bounds() {
        let mut config = AppConfig {
            code_ttl_secs: 0,
            ..AppConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        config.code_ttl_secs = MAX_CODE_TTL_SECS + 1;
        assert!(config.validate().is_err());

        config.code_ttl_secs = MAX_CODE_TTL_SECS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn id_token_lifetime_bounds() {
        let mut config = AppConfig {
            id_token_lifetime_secs: i64::MAX,
            ..AppConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        config.id_token_lifetime_secs = MAX_ID_TOKEN_LIFETIME_SECS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_bad_header_name() {
        let config = AppConfig {
            session: SessionConfig {
                source: SessionSource::Header,
                name: "not a header".to_string(),
            },
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(config.session_resolver().is_err());
    }
}
