use axum::{
    Json,
    extract::{
        Multipart, State,
        multipart::{Field, MultipartError, MultipartRejection},
    },
    http::StatusCode,
};
use bytes::{Bytes, BytesMut};
use tracing::{debug, info, instrument};

use crate::{
    AppState,
    api::models::upload::{ErrorResponse, UploadResponse},
    auth::ShopifyRequest,
    errors::{Error, Result},
    metrics::{UploadOutcome, record_upload},
    storage::{ObjectKey, ResourceType, UploadRequest},
};

/// Multipart field the PDF must be sent in
pub const PDF_FIELD: &str = "pdf";

/// The PDF pulled out of a multipart body.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// File name supplied by the client, if any
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

#[utoipa::path(
    post,
    path = "/api/upload",
    tag = "upload",
    summary = "Upload card PDF",
    description = "Store a PDF sent by a Shopify storefront and return its public URL. \
        The query string must carry a valid Shopify signature.",
    params(
        ("shop" = String, Query, description = "Shop domain, e.g. `demo.myshopify.com`"),
        ("timestamp" = String, Query, description = "Unix timestamp the request was signed at"),
        ("hmac" = String, Query, description = "Hex HMAC-SHA256 of the other query parameters"),
    ),
    request_body(
        content_type = "multipart/form-data",
        description = "A single file in the `pdf` field"
    ),
    responses(
        (status = 200, description = "PDF stored", body = UploadResponse),
        (status = 400, description = "No PDF file, or the body is not a valid multipart form", body = ErrorResponse),
        (status = 401, description = "Missing or invalid signature", body = ErrorResponse),
        (status = 405, description = "Method other than POST"),
        (status = 413, description = "PDF exceeds the configured size limit", body = ErrorResponse),
        (status = 500, description = "Storage provider failed", body = ErrorResponse)
    )
)]
#[instrument(skip_all, fields(shop = %request.shop))]
pub async fn upload_card(
    State(state): State<AppState>,
    request: ShopifyRequest,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>> {
    let mut multipart = multipart.map_err(|rejection| Error::MalformedPayload {
        reason: rejection.body_text(),
    })?;

    let upload_config = &state.config.upload;
    let file = read_pdf_field(&mut multipart, upload_config.max_file_size).await?;

    let key = ObjectKey::generate(&upload_config.folder, &upload_config.key_prefix);
    let size = file.data.len();
    info!(object_key = %key, size, content_type = ?file.content_type, "Uploading card PDF");

    let stored = state
        .storage
        .upload(UploadRequest {
            key: key.clone(),
            data: file.data,
            file_name: file.file_name,
            resource_type: ResourceType::Raw,
        })
        .await
        .map_err(|source| Error::Upstream {
            provider: state.storage.name(),
            source,
        })?;

    info!(object_key = %key, public_id = %stored.public_id, "Card PDF stored");
    record_upload(UploadOutcome::Success);

    Ok(Json(UploadResponse {
        file_url: stored.secure_url,
    }))
}

/// Any method other than POST on the upload route.
pub async fn method_not_allowed() -> Error {
    Error::MethodNotAllowed
}

/// Read the single `pdf` file out of a multipart body.
///
/// Text fields are skipped, including a `pdf` part sent without a filename. A file in any other
/// field, or a second `pdf` file, makes the body malformed. A missing or empty `pdf` is
/// [`Error::MissingPayload`].
pub async fn read_pdf_field(multipart: &mut Multipart, max_file_size: usize) -> Result<UploadedFile> {
    let mut pdf: Option<UploadedFile> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_file_size))?
    {
        let name = field.name().unwrap_or("").to_string();
        let is_file = field.file_name().is_some();

        if name == PDF_FIELD && is_file {
            if pdf.is_some() {
                return Err(Error::MalformedPayload {
                    reason: format!("more than one `{PDF_FIELD}` field"),
                });
            }

            let file_name = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(str::to_string);
            let data = read_field_limited(field, max_file_size).await?;

            debug!(file_name = ?file_name, size = data.len(), "Read pdf field");
            pdf = Some(UploadedFile {
                file_name,
                content_type,
                data,
            });
        } else if is_file {
            return Err(Error::MalformedPayload {
                reason: format!("unexpected file field `{name}`"),
            });
        } else {
            debug!(field = %name, "Skipping form field");
        }
    }

    match pdf {
        Some(file) if !file.data.is_empty() => Ok(file),
        _ => Err(Error::MissingPayload),
    }
}

async fn read_field_limited(mut field: Field<'_>, max_file_size: usize) -> Result<Bytes> {
    let mut buffer = BytesMut::new();

    while let Some(chunk) = field.chunk().await.map_err(|e| multipart_error(e, max_file_size))? {
        if buffer.len() + chunk.len() > max_file_size {
            return Err(Error::PayloadTooLarge { limit: max_file_size });
        }
        buffer.extend_from_slice(&chunk);
    }

    Ok(buffer.freeze())
}

fn multipart_error(err: MultipartError, max_file_size: usize) -> Error {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Error::PayloadTooLarge { limit: max_file_size }
    } else {
        Error::MalformedPayload { reason: err.body_text() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryProvider;
    use crate::test_utils::{
        FailingStorage, TEST_SHOP, create_test_config, create_test_server, create_test_server_with, pdf_form, signed_params,
    };
    use axum::http::{Method, header};
    use axum_test::{
        TestRequest, TestServer,
        multipart::{MultipartForm, Part},
    };
    use std::sync::Arc;

    const PDF: &[u8] = b"%PDF-1.7\n1 0 obj << /Type /Catalog >> endobj\n%%EOF";
    const AUTH_ERROR: &str = "Invalid or missing HMAC/shop/timestamp";

    fn signed_post(server: &TestServer) -> TestRequest {
        with_params(server.post("/api/upload"), &signed_params(TEST_SHOP, "1700000000"))
    }

    fn with_params(mut request: TestRequest, params: &[(String, String)]) -> TestRequest {
        for (key, value) in params {
            request = request.add_query_param(key, value);
        }
        request
    }

    fn error_body(message: &str) -> serde_json::Value {
        serde_json::json!({ "error": message })
    }

    #[tokio::test]
    async fn test_upload_success_returns_storage_url() {
        let (server, storage) = create_test_server();

        let response = signed_post(&server).multipart(pdf_form(PDF)).await;

        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        let object = body.as_object().unwrap();
        assert_eq!(object.len(), 1, "body must only contain file_url: {body}");

        let keys = storage.keys();
        assert_eq!(keys.len(), 1);
        assert_eq!(body["file_url"], storage.url_for(&keys[0]));
        assert!(keys[0].starts_with("cards/card_"));
        assert_eq!(storage.get(&keys[0]).unwrap(), Bytes::from_static(PDF));
    }

    #[tokio::test]
    async fn test_upload_same_file_twice_uses_distinct_keys() {
        let (server, storage) = create_test_server();

        let first: UploadResponse = signed_post(&server).multipart(pdf_form(PDF)).await.json();
        let second: UploadResponse = signed_post(&server).multipart(pdf_form(PDF)).await.json();

        assert_ne!(first.file_url, second.file_url);
        assert_eq!(storage.len(), 2);
    }

    #[tokio::test]
    async fn test_other_methods_are_rejected_with_allow_header() {
        let (server, storage) = create_test_server();

        for method in [Method::GET, Method::PUT, Method::DELETE, Method::PATCH] {
            let response = with_params(
                server.method(method.clone(), "/api/upload"),
                &signed_params(TEST_SHOP, "1700000000"),
            )
            .await;

            response.assert_status(StatusCode::METHOD_NOT_ALLOWED);
            assert_eq!(response.header(header::ALLOW), "POST", "method {method}");
            assert!(response.as_bytes().is_empty(), "method {method}");
        }

        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_missing_auth_params_rejected() {
        let (server, storage) = create_test_server();
        let full = signed_params(TEST_SHOP, "1700000000");

        for missing in ["shop", "timestamp", "hmac"] {
            let params: Vec<_> = full.iter().filter(|(k, _)| k != missing).cloned().collect();

            let response = with_params(server.post("/api/upload"), &params)
                .multipart(pdf_form(PDF))
                .await;

            response.assert_status(StatusCode::UNAUTHORIZED);
            response.assert_json(&error_body(AUTH_ERROR));
        }

        let response = server.post("/api/upload").multipart(pdf_form(PDF)).await;
        response.assert_status(StatusCode::UNAUTHORIZED);

        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_bad_signature_looks_like_missing_params() {
        let (server, storage) = create_test_server();

        let missing = server.post("/api/upload").multipart(pdf_form(PDF)).await;

        let bad = server
            .post("/api/upload")
            .add_raw_query_param(&format!("shop={TEST_SHOP}&timestamp=1700000000&hmac={}", "ab".repeat(32)))
            .multipart(pdf_form(PDF))
            .await;

        bad.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(bad.as_bytes(), missing.as_bytes());
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_tampered_shop_rejected() {
        let (server, _storage) = create_test_server();
        let mut params = signed_params(TEST_SHOP, "1700000000");
        params[0].1 = "someone-else.myshopify.com".to_string();

        let response = with_params(server.post("/api/upload"), &params)
            .multipart(pdf_form(PDF))
            .await;

        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_stale_timestamp_rejected_when_window_configured() {
        let mut config = create_test_config();
        config.shopify.max_timestamp_age = Some(std::time::Duration::from_secs(300));
        let storage = Arc::new(MemoryProvider::new(config.storage.memory.base_url.clone()));
        let server = create_test_server_with(config, storage.clone());

        let stale = signed_post(&server).multipart(pdf_form(PDF)).await;
        stale.assert_status(StatusCode::UNAUTHORIZED);
        stale.assert_json(&error_body(AUTH_ERROR));

        let now = chrono::Utc::now().timestamp().to_string();
        let fresh = with_params(server.post("/api/upload"), &signed_params(TEST_SHOP, &now))
            .multipart(pdf_form(PDF))
            .await;
        fresh.assert_status_ok();
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn test_auth_checked_before_body() {
        let (server, _storage) = create_test_server();

        let response = server.post("/api/upload").text("not multipart at all").await;

        response.assert_status(StatusCode::UNAUTHORIZED);
        response.assert_json(&error_body(AUTH_ERROR));
    }

    #[tokio::test]
    async fn test_missing_pdf_field() {
        let (server, storage) = create_test_server();

        let response = signed_post(&server)
            .multipart(MultipartForm::new().add_text("note", "hello"))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        response.assert_json(&error_body("No PDF file uploaded"));
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_empty_pdf_field() {
        let (server, storage) = create_test_server();

        let response = signed_post(&server).multipart(pdf_form(b"")).await;

        response.assert_status(StatusCode::BAD_REQUEST);
        response.assert_json(&error_body("No PDF file uploaded"));
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_text_fields_are_ignored() {
        let (server, storage) = create_test_server();

        let form = MultipartForm::new().add_text("order_id", "1001").add_part(
            PDF_FIELD,
            Part::bytes(PDF).file_name("card.pdf").mime_type("application/pdf"),
        );
        let response = signed_post(&server).multipart(form).await;

        response.assert_status_ok();
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn test_pdf_text_field_is_not_a_file() {
        let (server, storage) = create_test_server();

        let response = signed_post(&server)
            .multipart(MultipartForm::new().add_text(PDF_FIELD, "just some text"))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        response.assert_json(&error_body("No PDF file uploaded"));
        assert!(storage.is_empty());

        // A text `pdf` next to the real file does not count as a duplicate
        let form = MultipartForm::new()
            .add_text(PDF_FIELD, "just some text")
            .add_part(PDF_FIELD, Part::bytes(PDF).file_name("card.pdf"));
        signed_post(&server).multipart(form).await.assert_status_ok();
        assert_eq!(storage.get(&storage.keys()[0]).unwrap(), Bytes::from_static(PDF));
    }

    #[tokio::test]
    async fn test_file_in_other_field_is_malformed() {
        let (server, storage) = create_test_server();

        let form = MultipartForm::new().add_part("file", Part::bytes(PDF).file_name("card.pdf"));
        let response = signed_post(&server).multipart(form).await;

        response.assert_status(StatusCode::BAD_REQUEST);
        response.assert_json(&error_body("Malformed multipart body"));
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_pdf_field_is_malformed() {
        let (server, storage) = create_test_server();

        let form = MultipartForm::new()
            .add_part(PDF_FIELD, Part::bytes(PDF).file_name("a.pdf"))
            .add_part(PDF_FIELD, Part::bytes(PDF).file_name("b.pdf"));
        let response = signed_post(&server).multipart(form).await;

        response.assert_status(StatusCode::BAD_REQUEST);
        response.assert_json(&error_body("Malformed multipart body"));
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_non_multipart_body_is_malformed() {
        let (server, _storage) = create_test_server();

        let response = signed_post(&server).json(&serde_json::json!({ "pdf": "base64..." })).await;

        response.assert_status(StatusCode::BAD_REQUEST);
        response.assert_json(&error_body("Malformed multipart body"));
    }

    #[tokio::test]
    async fn test_truncated_multipart_is_malformed() {
        let (server, _storage) = create_test_server();

        let body = "--XBOUNDARY\r\nContent-Disposition: form-data; name=\"pdf\"; filename=\"card.pdf\"\r\n\r\n%PDF-1.7";
        let response = signed_post(&server)
            .content_type("multipart/form-data; boundary=XBOUNDARY")
            .bytes(Bytes::from_static(body.as_bytes()))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        response.assert_json(&error_body("Malformed multipart body"));
    }

    #[tokio::test]
    async fn test_oversized_pdf_rejected() {
        let mut config = create_test_config();
        config.upload.max_file_size = 1024;
        let storage = Arc::new(MemoryProvider::new(config.storage.memory.base_url.clone()));
        let server = create_test_server_with(config, storage.clone());

        let response = signed_post(&server).multipart(pdf_form(&[b'x'; 2048])).await;

        response.assert_status(StatusCode::PAYLOAD_TOO_LARGE);
        response.assert_json(&error_body("PDF file too large"));
        assert!(storage.is_empty());

        // Exactly at the limit is fine
        let response = signed_post(&server).multipart(pdf_form(&[b'x'; 1024])).await;
        response.assert_status_ok();
    }

    #[test_log::test(tokio::test)]
    async fn test_storage_failure_returns_generic_error() {
        let server = create_test_server_with(create_test_config(), Arc::new(FailingStorage));

        let response = signed_post(&server).multipart(pdf_form(PDF)).await;

        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        let body: serde_json::Value = response.json();
        assert_eq!(body, error_body("Upload to storage failed"));
        assert!(body.get("file_url").is_none());
    }

    #[tokio::test]
    async fn test_upload_path_is_configurable() {
        let mut config = create_test_config();
        config.upload.path = "/apps/cards/upload".to_string();
        config.upload.folder = "gift-cards".to_string();
        let storage = Arc::new(MemoryProvider::new(config.storage.memory.base_url.clone()));
        let server = create_test_server_with(config, storage.clone());

        let response = with_params(
            server.post("/apps/cards/upload"),
            &signed_params(TEST_SHOP, "1700000000"),
        )
        .multipart(pdf_form(PDF))
        .await;

        response.assert_status_ok();
        assert!(storage.keys()[0].starts_with("gift-cards/card_"));

        server.post("/api/upload").await.assert_status_not_found();
    }
}
