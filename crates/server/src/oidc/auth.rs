//! Request extractors for the authenticated principal.

use axum::{extract::FromRequestParts, http::request::Parts};
use std::convert::Infallible;

use crate::directory::DirectoryError;
use crate::error::OidcError;
use crate::oidc::state::OidcState;

/// Principal resolved by the configured [`SessionResolver`](crate::oidc::session::SessionResolver).
///
/// Never rejects; handlers decide what a missing principal means.
#[derive(Debug, Clone)]
pub struct SessionPrincipal(pub Option<String>);

impl FromRequestParts<OidcState> for SessionPrincipal {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &OidcState,
    ) -> Result<Self, Self::Rejection> {
        Ok(SessionPrincipal(state.session.resolve(parts)))
    }
}

/// The user a request acts for.
///
/// An outer middleware that already authenticated the request can insert an
/// `AuthenticatedUser` into the request extensions; that value is used as is.
/// Otherwise the session resolver is consulted only if it is an authenticated
/// source (see [`SessionResolver::authenticates`]), and the principal must exist
/// in the user directory. Anything else is rejected with 401.
///
/// [`SessionResolver::authenticates`]: crate::oidc::session::SessionResolver::authenticates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub email: String,
}

impl FromRequestParts<OidcState> for AuthenticatedUser {
    type Rejection = OidcError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &OidcState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>() {
            return Ok(user.clone());
        }

        // only authenticating sources may name the principal here
        if !state.session.authenticates() {
            return Err(OidcError::Unauthorized);
        }
        let principal = state.session.resolve(parts).ok_or(OidcError::Unauthorized)?;
        let user = match state.directory.get(&principal).await {
            Ok(Some(user)) => user,
            Ok(None) | Err(DirectoryError::NotFound(_)) => return Err(OidcError::Unauthorized),
            Err(e) => return Err(e.into()),
        };

        Ok(AuthenticatedUser {
            user_id: user.id,
            email: user.email,
        })
    }
}
