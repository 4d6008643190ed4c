//! Shared helpers for unit and HTTP-level tests.

use std::sync::Arc;

use async_trait::async_trait;
use axum_test::{
    TestServer,
    multipart::{MultipartForm, Part},
};

use crate::{
    Application,
    auth::signing,
    config::{Config, Secret, StorageProviderKind},
    storage::{self, StorageError, StorageProvider, StoredObject, UploadRequest, memory::MemoryProvider},
};

pub const TEST_SECRET: &str = "test-shopify-secret";
pub const TEST_SHOP: &str = "card-shop.myshopify.com";

/// reqwest is built without a default TLS crypto provider; tests that construct a client must
/// install one first. Safe to call repeatedly.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

pub fn create_test_config() -> Config {
    let mut config = Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        ..Default::default()
    };

    config.shopify.api_key = "test-api-key".to_string();
    config.shopify.api_secret = Secret::from(TEST_SECRET.to_string());
    config.shopify.host_name = "cards.test".to_string();
    config.storage.provider = StorageProviderKind::Memory;

    config
}

/// Test server with the default test config, backed by an in-memory store the caller can inspect.
pub fn create_test_server() -> (TestServer, Arc<MemoryProvider>) {
    let config = create_test_config();
    let storage = Arc::new(MemoryProvider::new(config.storage.memory.base_url.clone()));
    let server = create_test_server_with(config, storage.clone());
    (server, storage)
}

pub fn create_test_server_with(config: Config, storage: Arc<dyn StorageProvider>) -> TestServer {
    Application::with_storage(config, storage).into_test_server()
}

/// Query parameters for `shop` and `timestamp`, signed with [`TEST_SECRET`], `hmac` last.
pub fn signed_params(shop: &str, timestamp: &str) -> Vec<(String, String)> {
    let mut params = vec![
        ("shop".to_string(), shop.to_string()),
        ("timestamp".to_string(), timestamp.to_string()),
    ];
    let hmac = signing::sign_query(&params, TEST_SECRET.as_bytes()).expect("HMAC accepts any key length");
    params.push(("hmac".to_string(), hmac));
    params
}

/// A multipart form with `data` as the `pdf` file.
pub fn pdf_form(data: &[u8]) -> MultipartForm {
    MultipartForm::new().add_part(
        "pdf",
        Part::bytes(data.to_vec()).file_name("card.pdf").mime_type("application/pdf"),
    )
}

/// Storage provider that rejects every upload.
pub struct FailingStorage;

#[async_trait]
impl StorageProvider for FailingStorage {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn upload(&self, _request: UploadRequest) -> storage::Result<StoredObject> {
        Err(StorageError::Provider {
            status: 500,
            message: "simulated outage".to_string(),
        })
    }
}
