//! OIDC HTTP endpoints.
//!
//! - Authorization endpoint
//! - Token endpoint
//! - UserInfo
//! - Discovery document and JWKS
//! - Logout

use crate::directory::DirectoryError;
use crate::error::{ErrorResponse, OidcError};
use crate::oidc::auth::{AuthenticatedUser, SessionPrincipal};
use crate::oidc::codes::{AuthorizationGrant, RedeemError, generate_token};
use crate::oidc::keys::{IdTokenClaims, Jwks, SIGNING_ALGORITHM};
use crate::oidc::{OIDC_TAG, state::OidcState};
use axum::{
    Form, Json,
    extract::{Query, State},
    http::{
        HeaderMap, StatusCode,
        header::{CACHE_CONTROL, LOCATION, PRAGMA},
    },
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

/// Scope every token response is guaranteed to contain.
pub const OPENID_SCOPE: &str = "openid";

const AUTHORIZATION_CODE_GRANT: &str = "authorization_code";

/// Creates the OIDC router.
pub fn router(state: OidcState) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(authorize))
        .routes(routes!(token))
        .routes(routes!(userinfo))
        .routes(routes!(openid_configuration))
        .routes(routes!(jwks))
        .routes(routes!(logout))
        .with_state(state)
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Authorization request parameters.
///
/// Everything is optional at the extractor level so missing fields surface as
/// `invalid_request` rather than a generic query rejection.
#[derive(Debug, Deserialize, ToSchema)]
pub struct AuthorizeRequest {
    /// Must be "code"
    pub response_type: Option<String>,
    pub client_id: Option<String>,
    /// Absolute URI the code is delivered to
    pub redirect_uri: Option<String>,
    /// Opaque value returned unchanged in the redirect
    pub state: Option<String>,
    /// Copied into the ID token
    pub nonce: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TokenRequest {
    pub grant_type: Option<String>,
    pub code: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub id_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Lifetime of the ID token in seconds
    pub expires_in: i64,
    pub scope: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserInfoResponse {
    pub sub: String,
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OpenIdConfiguration {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    pub jwks_uri: String,
    pub end_session_endpoint: String,
    pub response_types_supported: Vec<String>,
    pub subject_types_supported: Vec<String>,
    pub id_token_signing_alg_values_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub scopes_supported: Vec<String>,
    pub claims_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
}

// =============================================================================
// Endpoints
// =============================================================================

/// Authorization endpoint.
///
/// The principal is taken from the configured session resolver; the request
/// is assumed to have been authenticated upstream.
#[tracing::instrument(skip(state, params, principal))]
#[utoipa::path(
    get,
    path = "/authorize",
    tag = OIDC_TAG,
    operation_id = "OIDC Authorize",
    summary = "Issue an authorization code",
    description = "Validates the authorization request and redirects to `redirect_uri` with a \
                   single-use `code` and the caller's `state` appended.\n\n\
                   Nothing is redirected unless `redirect_uri` is a well-formed absolute URI; \
                   invalid requests get a 400 JSON error instead.\n\n\
                   The principal is read from the session (by default the `principal` query parameter).",
    params(
        ("response_type" = String, Query, description = "Must be `code`."),
        ("client_id" = String, Query, description = "Client identifier."),
        ("redirect_uri" = String, Query, description = "Absolute URI to redirect to."),
        ("state" = Option<String>, Query, description = "Opaque value returned unchanged in the redirect."),
        ("nonce" = Option<String>, Query, description = "Value copied into the ID token `nonce` claim."),
        ("principal" = Option<String>, Query, description = "User id of the authenticated principal when the query session source is used."),
    ),
    responses(
        (status = 302, description = "Redirect back to the client with an authorization code"),
        (status = 400, description = "Missing or invalid request parameters", body = ErrorResponse),
    )
)]
pub async fn authorize(
    State(state): State<OidcState>,
    SessionPrincipal(principal): SessionPrincipal,
    Query(params): Query<AuthorizeRequest>,
) -> Result<Response, OidcError> {
    match params.response_type.as_deref() {
        Some("code") => {}
        Some(_) => {
            return Err(OidcError::InvalidRequest(
                "Only 'code' response type is supported".to_string(),
            ));
        }
        None => {
            return Err(OidcError::InvalidRequest(
                "response_type is required".to_string(),
            ));
        }
    }

    let client_id = required(params.client_id, "client_id")?;
    let redirect_uri = required(params.redirect_uri, "redirect_uri")?;
    let mut redirect_url = url::Url::parse(&redirect_uri)
        .map_err(|_| OidcError::InvalidRequest("redirect_uri is not a valid URI".to_string()))?;
    if redirect_url.fragment().is_some() {
        return Err(OidcError::InvalidRequest(
            "redirect_uri must not contain a fragment".to_string(),
        ));
    }

    let subject = principal
        .ok_or_else(|| OidcError::InvalidRequest("No authenticated principal".to_string()))?;

    let code = state.codes.issue(AuthorizationGrant {
        subject: subject.clone(),
        client_id: client_id.clone(),
        redirect_uri,
        nonce: params.nonce,
    });
    tracing::info!(%subject, %client_id, "Issued authorization code");

    set_redirect_params(&mut redirect_url, &code, params.state.as_deref());

    Ok((StatusCode::FOUND, [(LOCATION, redirect_url.to_string())]).into_response())
}

/// Token endpoint.
#[tracing::instrument(skip(state, headers, params))]
#[utoipa::path(
    post,
    path = "/token",
    tag = OIDC_TAG,
    operation_id = "OIDC Token",
    summary = "Exchange an authorization code for tokens",
    description = "Redeems a single-use authorization code for a signed ID token, an opaque access token \
                   and an opaque refresh token.\n\n\
                   **Supported grant types:** `authorization_code`\n\n\
                   The code must be redeemed by the `client_id` it was issued to, and if `redirect_uri` is \
                   sent it must equal the one used at authorization. The returned `scope` always contains `openid`. \
                   A new refresh token replaces any previous one for the user.",
    request_body(
        content = TokenRequest,
        content_type = "application/x-www-form-urlencoded",
        description = "Token request parameters"
    ),
    responses(
        (status = 200, description = "Tokens issued", body = TokenResponse),
        (status = 400, description = "Invalid request, unsupported grant type, or unknown, expired or used code", body = ErrorResponse),
        (status = 500, description = "Signing or directory failure", body = ErrorResponse),
    )
)]
pub async fn token(
    State(state): State<OidcState>,
    headers: HeaderMap,
    Form(params): Form<TokenRequest>,
) -> Result<Response, OidcError> {
    match params.grant_type.as_deref() {
        Some(AUTHORIZATION_CODE_GRANT) => {}
        Some(_) => return Err(OidcError::UnsupportedGrantType),
        None => {
            return Err(OidcError::InvalidRequest(
                "grant_type is required".to_string(),
            ));
        }
    }
    let code = required(params.code, "code")?;
    // checked before redemption so a malformed request leaves the code usable
    let client_id = required(params.client_id, "client_id")?;

    let grant = state.codes.redeem(&code).map_err(|e| match e {
        RedeemError::Unknown => {
            OidcError::InvalidGrant("Unknown or already used authorization code".to_string())
        }
        RedeemError::Expired => OidcError::InvalidGrant("Authorization code expired".to_string()),
    })?;

    if grant.client_id != client_id {
        tracing::warn!(
            subject = %grant.subject,
            %client_id,
            "Authorization code redeemed by a different client"
        );
        return Err(OidcError::InvalidGrant(
            "Authorization code was issued to another client".to_string(),
        ));
    }
    if let Some(redirect_uri) = params.redirect_uri.as_deref()
        && redirect_uri != grant.redirect_uri
    {
        return Err(OidcError::InvalidGrant("redirect_uri mismatch".to_string()));
    }

    let now = OffsetDateTime::now_utc().unix_timestamp();
    let claims = IdTokenClaims {
        iss: state.issuer(&headers),
        sub: grant.subject.clone(),
        aud: client_id.clone(),
        iat: now,
        exp: now.saturating_add(state.id_token_lifetime),
        nonce: grant.nonce,
    };
    let id_token = state.keys().sign(&claims)?;

    let access_token = generate_token();
    let refresh_token = generate_token();
    state
        .directory
        .save_refresh_token(&grant.subject, &refresh_token)
        .await?;

    tracing::info!(subject = %grant.subject, %client_id, "Issued tokens");

    let body = TokenResponse {
        access_token,
        id_token,
        refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: state.id_token_lifetime,
        scope: normalize_scope(params.scope.as_deref()),
    };
    Ok((
        [(CACHE_CONTROL, "no-store"), (PRAGMA, "no-cache")],
        Json(body),
    )
        .into_response())
}

/// UserInfo endpoint.
#[tracing::instrument(skip(user), fields(subject = %user.user_id))]
#[utoipa::path(
    get,
    path = "/userinfo",
    tag = OIDC_TAG,
    operation_id = "OIDC UserInfo",
    summary = "Claims about the authenticated user",
    description = "Returns `sub` and `email` for the principal of the request.\n\n\
                   The request must already be authenticated: either an outer middleware attached the \
                   user to the request, or an authenticating proxy header names a principal known to the \
                   user directory. The `principal` query parameter is never accepted here. \
                   Access tokens are not inspected.",
    responses(
        (status = 200, description = "User claims", body = UserInfoResponse),
        (status = 401, description = "No authenticated principal", body = ErrorResponse),
    )
)]
pub async fn userinfo(user: AuthenticatedUser) -> Json<UserInfoResponse> {
    Json(UserInfoResponse {
        sub: user.user_id,
        email: user.email,
    })
}

/// OpenID Connect Discovery document.
#[tracing::instrument(skip(state, headers))]
#[utoipa::path(
    get,
    path = "/.well-known/openid-configuration",
    tag = OIDC_TAG,
    operation_id = "OpenID Connect Discovery",
    summary = "OpenID Connect Discovery document",
    description = "Provider metadata. The issuer is the configured `issuer_url`, or `http://` plus the \
                   request's Host header; ID tokens carry the same issuer.",
    responses(
        (status = 200, description = "OpenID Connect configuration document", body = OpenIdConfiguration),
    )
)]
pub async fn openid_configuration(
    State(state): State<OidcState>,
    headers: HeaderMap,
) -> Json<OpenIdConfiguration> {
    let issuer = state.issuer(&headers);
    let strings = |values: &[&str]| values.iter().map(|v| v.to_string()).collect::<Vec<_>>();

    Json(OpenIdConfiguration {
        authorization_endpoint: format!("{issuer}/authorize"),
        token_endpoint: format!("{issuer}/token"),
        userinfo_endpoint: format!("{issuer}/userinfo"),
        jwks_uri: format!("{issuer}/jwks"),
        end_session_endpoint: format!("{issuer}/logout"),
        issuer,
        response_types_supported: strings(&["code"]),
        subject_types_supported: strings(&["public"]),
        id_token_signing_alg_values_supported: strings(&[SIGNING_ALGORITHM]),
        grant_types_supported: strings(&[AUTHORIZATION_CODE_GRANT]),
        scopes_supported: strings(&[OPENID_SCOPE, "email"]),
        claims_supported: strings(&["iss", "sub", "aud", "iat", "exp", "nonce", "email"]),
        token_endpoint_auth_methods_supported: strings(&["none"]),
    })
}

/// JSON Web Key Set.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/jwks",
    tag = OIDC_TAG,
    operation_id = "OIDC JWKS",
    summary = "Public signing keys",
    description = "Every key that may have signed a live ID token, recomputed on each request.",
    responses(
        (status = 200, description = "JSON Web Key Set", body = Jwks),
    )
)]
pub async fn jwks(State(state): State<OidcState>) -> Json<Jwks> {
    Json(state.keys().jwks())
}

/// Logout endpoint.
///
/// Always 200: revoking an unknown user or a user without a refresh token is
/// indistinguishable from revoking a live one.
#[tracing::instrument(skip(state, principal))]
#[utoipa::path(
    get,
    path = "/logout",
    tag = OIDC_TAG,
    operation_id = "OIDC Logout",
    summary = "Revoke the principal's refresh token",
    description = "Clears the stored refresh token of the session's principal. Idempotent; the response \
                   does not reveal whether anything was revoked.",
    params(
        ("principal" = Option<String>, Query, description = "User id of the principal when the query session source is used."),
    ),
    responses(
        (status = 200, description = "Logged out"),
    )
)]
pub async fn logout(
    State(state): State<OidcState>,
    SessionPrincipal(principal): SessionPrincipal,
) -> StatusCode {
    let Some(subject) = principal else {
        tracing::debug!("Logout without principal");
        return StatusCode::OK;
    };

    match state.directory.revoke_refresh_token(&subject).await {
        Ok(()) => tracing::info!(%subject, "Revoked refresh token"),
        Err(DirectoryError::NotFound(_)) => {
            tracing::debug!(%subject, "Logout for unknown user");
        }
        Err(e) => tracing::error!(%subject, error = %e, "Failed to revoke refresh token"),
    }
    StatusCode::OK
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Set `code` and a non-empty `state` on the redirect, replacing any values the
/// client put there itself.
fn set_redirect_params(url: &mut url::Url, code: &str, state: Option<&str>) {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "code" && k != "state")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut pairs = url.query_pairs_mut();
    pairs.clear().extend_pairs(kept).append_pair("code", code);
    if let Some(state) = state.filter(|s| !s.is_empty()) {
        pairs.append_pair("state", state);
    }
}

fn required(value: Option<String>, name: &str) -> Result<String, OidcError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| OidcError::InvalidRequest(format!("{name} is required")))
}

/// Ensure `openid` is one of the space-separated scope tokens.
fn normalize_scope(scope: Option<&str>) -> String {
    let scope = scope.unwrap_or_default().trim();
    if scope.split_whitespace().any(|s| s == OPENID_SCOPE) {
        scope.to_string()
    } else if scope.is_empty() {
        OPENID_SCOPE.to_string()
    } else {
        format!("{scope} {OPENID_SCOPE}")
    }
}
