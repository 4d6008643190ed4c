//! OpenAPI documentation for the HTTP surface.
//!
//! The document is generated from the `utoipa` annotations on the handlers and served at
//! `/api-docs/openapi.json`. The upload path in the served document follows `upload.path`.

use axum::{Json, extract::State};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
};

use crate::{
    AppState,
    api::{
        self,
        models::{
            health::HealthResponse,
            upload::{ErrorResponse, UploadResponse},
        },
    },
};

/// Path the upload handler is annotated with
const DOCUMENTED_UPLOAD_PATH: &str = "/api/upload";

/// Documents the signed query string as a security scheme.
struct ShopifySignatureAddon;

impl Modify for ShopifySignatureAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "ShopifyHmac".to_string(),
                SecurityScheme::ApiKey(ApiKey::Query(ApiKeyValue::with_description(
                    "hmac",
                    "Hex HMAC-SHA256 of the other query parameters (sorted, form-urlencoded), \
                     keyed with the Shopify app secret. `shop` and `timestamp` must be present too.",
                ))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Card Upload API",
        description = "Stores PDFs sent by Shopify storefronts and returns their public URL."
    ),
    modifiers(&ShopifySignatureAddon),
    paths(
        api::handlers::upload::upload_card,
        api::handlers::health::healthz,
    ),
    components(
        schemas(UploadResponse, ErrorResponse, HealthResponse)
    ),
    tags(
        (name = "upload", description = "Signed PDF upload"),
        (name = "health", description = "Liveness probe"),
    )
)]
pub struct ApiDoc;

/// Build the document with the upload endpoint at `upload_path`.
pub fn document(upload_path: &str) -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();

    if upload_path != DOCUMENTED_UPLOAD_PATH
        && let Some(item) = doc.paths.paths.remove(DOCUMENTED_UPLOAD_PATH)
    {
        doc.paths.paths.insert(upload_path.to_string(), item);
    }

    doc
}

pub async fn openapi_json(State(state): State<AppState>) -> Json<utoipa::openapi::OpenApi> {
    Json(document(&state.config.upload.path))
}
