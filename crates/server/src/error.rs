use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::WWW_AUTHENTICATE},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::directory::DirectoryError;
use crate::oidc::keys::KeyError;

/// Protocol-level failures surfaced by the OIDC endpoints.
#[derive(Debug, Error)]
pub enum OidcError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Invalid grant: {0}")]
    InvalidGrant(String),
    #[error("Unsupported grant type")]
    UnsupportedGrantType,
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Failed to sign token: {0}")]
    SigningFailure(#[from] KeyError),
    #[error("User directory unavailable: {0}")]
    DirectoryUnavailable(#[from] DirectoryError),
}

/// OAuth2 error body (RFC 6749 section 5.2).
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl OidcError {
    /// OAuth2 error code sent in the `error` field.
    pub fn code(&self) -> &'static str {
        match self {
            OidcError::InvalidRequest(_) => "invalid_request",
            OidcError::InvalidGrant(_) => "invalid_grant",
            OidcError::UnsupportedGrantType => "unsupported_grant_type",
            OidcError::Unauthorized => "unauthorized",
            OidcError::SigningFailure(_) | OidcError::DirectoryUnavailable(_) => "server_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            OidcError::InvalidRequest(_)
            | OidcError::InvalidGrant(_)
            | OidcError::UnsupportedGrantType => StatusCode::BAD_REQUEST,
            OidcError::Unauthorized => StatusCode::UNAUTHORIZED,
            OidcError::SigningFailure(_) | OidcError::DirectoryUnavailable(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Server faults keep their details in the log, not in the response body.
    fn description(&self) -> Option<String> {
        match self {
            OidcError::InvalidRequest(d) | OidcError::InvalidGrant(d) => Some(d.clone()),
            OidcError::UnsupportedGrantType => {
                Some("Only 'authorization_code' is supported".to_string())
            }
            OidcError::Unauthorized => Some("No authenticated principal".to_string()),
            OidcError::SigningFailure(_) | OidcError::DirectoryUnavailable(_) => None,
        }
    }
}

impl IntoResponse for OidcError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed with internal error");
        } else {
            tracing::debug!(error = %self, "Rejected request");
        }

        let body = Json(ErrorResponse {
            error: self.code().to_string(),
            error_description: self.description(),
        });

        let mut response = (status, body).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}
