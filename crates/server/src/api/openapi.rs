//! OpenAPI/Utoipa configuration.

use crate::api::health::MISC_TAG;
use crate::oidc::OIDC_TAG;
use utoipa::OpenApi;

/// OpenAPI documentation configuration.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Light IdP API",
        version = "0.1.0",
        description = "Minimal OpenID Connect provider for pre-authenticated principals."
    ),
    tags(
        (name = MISC_TAG, description = "Miscellaneous endpoints"),
        (name = OIDC_TAG, description = "OpenID Connect endpoints")
    )
)]
pub struct ApiDoc;
