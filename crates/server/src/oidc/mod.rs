//! OpenID Connect provider.
//!
//! Implements the authorization code flow for pre-authenticated principals:
//! the provider never sees a password, it trusts the [`SessionResolver`] to
//! name the user a request acts for.
//!
//! ## Endpoints
//!
//! - `GET /authorize` - Authorization endpoint, redirects with a single-use code
//! - `POST /token` - Code exchange for ID, access and refresh tokens
//! - `GET /userinfo` - Claims of the authenticated user
//! - `GET /logout` - Refresh token revocation
//! - `GET /.well-known/openid-configuration` - Discovery document
//! - `GET /jwks` - Public signing keys

pub mod auth;
pub mod codes;
pub mod endpoints;
pub mod keys;
pub mod session;
mod state;

pub use auth::AuthenticatedUser;
pub use codes::CodeRegistry;
pub use endpoints::router;
pub use keys::{KeyManager, SigningKey};
pub use session::{HeaderPrincipal, QueryPrincipal, SessionResolver};
pub use state::{DEFAULT_ID_TOKEN_LIFETIME, OidcState};

/// OpenAPI tag for OIDC endpoints
pub const OIDC_TAG: &str = "OIDC";
