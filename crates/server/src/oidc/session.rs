//! Where the authenticated principal of a request comes from.
//!
//! The provider does not log users in itself. A [`SessionResolver`] picks the
//! principal out of a request that has already been authenticated elsewhere:
//! an authenticating reverse proxy setting a header, or (for development and
//! tests) a plain query parameter.

use axum::http::HeaderName;
use axum::http::request::Parts;

/// Legacy query parameter name still accepted by [`QueryPrincipal`].
pub const LEGACY_PRINCIPAL_PARAM: &str = "user_id";

pub trait SessionResolver: Send + Sync {
    /// The principal's user id, if the request carries one.
    fn resolve(&self, parts: &Parts) -> Option<String>;

    /// Whether a resolved principal proves the request was authenticated.
    ///
    /// Only such sources may back [`AuthenticatedUser`](crate::oidc::auth::AuthenticatedUser).
    fn authenticates(&self) -> bool {
        false
    }
}

/// Reads the principal from a query parameter.
///
/// This trusts the caller completely and belongs behind something that
/// controls the parameter.
#[derive(Debug, Clone)]
pub struct QueryPrincipal {
    name: String,
}

impl QueryPrincipal {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for QueryPrincipal {
    fn default() -> Self {
        Self::new("principal")
    }
}

impl SessionResolver for QueryPrincipal {
    fn resolve(&self, parts: &Parts) -> Option<String> {
        let query = parts.uri.query()?;
        let mut legacy = None;
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            if value.is_empty() {
                continue;
            }
            if key == self.name {
                return Some(value.into_owned());
            }
            if key == LEGACY_PRINCIPAL_PARAM && legacy.is_none() {
                legacy = Some(value.into_owned());
            }
        }
        legacy
    }
}

/// Reads the principal from a request header set by an authenticating proxy.
#[derive(Debug, Clone)]
pub struct HeaderPrincipal {
    header: HeaderName,
}

impl HeaderPrincipal {
    pub fn new(header: HeaderName) -> Self {
        Self { header }
    }
}

impl SessionResolver for HeaderPrincipal {
    fn resolve(&self, parts: &Parts) -> Option<String> {
        parts
            .headers
            .get(&self.header)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }

    fn authenticates(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(uri: &str) -> Parts {
        Request::get(uri).body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_query_principal() {
        let resolver = QueryPrincipal::default();
        assert_eq!(
            resolver.resolve(&parts("/authorize?client_id=abc&principal=123")),
            Some("123".to_string())
        );
        assert_eq!(resolver.resolve(&parts("/authorize?client_id=abc")), None);
        assert_eq!(resolver.resolve(&parts("/authorize")), None);
        assert_eq!(resolver.resolve(&parts("/authorize?principal=")), None);
    }

    #[test]
    fn test_query_principal_is_percent_decoded() {
        let resolver = QueryPrincipal::default();
        assert_eq!(
            resolver.resolve(&parts("/logout?principal=alice%40example.org")),
            Some("alice@example.org".to_string())
        );
    }

    #[test]
    fn test_query_principal_legacy_alias() {
        let resolver = QueryPrincipal::default();
        assert_eq!(
            resolver.resolve(&parts("/logout?user_id=123")),
            Some("123".to_string())
        );
        // the configured name wins over the alias
        assert_eq!(
            resolver.resolve(&parts("/logout?user_id=old&principal=new")),
            Some("new".to_string())
        );
    }

    #[test]
    fn test_custom_query_name() {
        let resolver = QueryPrincipal::new("sub");
        assert_eq!(
            resolver.resolve(&parts("/logout?sub=42&principal=1")),
            Some("42".to_string())
        );
    }

    #[test]
    fn test_header_principal() {
        let resolver = HeaderPrincipal::new(HeaderName::from_static("x-remote-user"));
        let (mut with_header, _) = Request::get("/userinfo")
            .header("x-remote-user", " 123 ")
            .body(())
            .unwrap()
            .into_parts();

        assert_eq!(resolver.resolve(&with_header), Some("123".to_string()));
        with_header.headers.clear();
        assert_eq!(resolver.resolve(&with_header), None);
        // query parameters are ignored
        assert_eq!(resolver.resolve(&parts("/userinfo?principal=123")), None);
    }

    #[test]
    fn test_only_header_source_authenticates() {
        assert!(!QueryPrincipal::default().authenticates());
        assert!(HeaderPrincipal::new(HeaderName::from_static("x-remote-user")).authenticates());
    }
}
