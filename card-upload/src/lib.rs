//! # card-upload: signed PDF uploads for Shopify storefronts
//!
//! `card-upload` is a small HTTP service that lets a Shopify storefront hand over a generated PDF
//! (a greeting card, a certificate, an invoice) and get back a public URL for it. The storefront
//! signs the request with the app's shared secret; the service checks that signature, pulls the
//! PDF out of the multipart body and forwards it to object storage.
//!
//! ## Request Flow
//!
//! A request to `POST /api/upload?shop=…&timestamp=…&hmac=…` goes through these steps in order,
//! and the first failing step decides the response:
//!
//! 1. **Method gate**: anything but `POST` gets `405` with `Allow: POST`.
//! 2. **Authentication** ([`auth`]): `shop`, `timestamp` and `hmac` must be present and the HMAC
//!    must verify, otherwise `401`.
//! 3. **Multipart extraction** ([`api::handlers::upload`]): exactly one non-empty file in the `pdf`
//!    field, otherwise `400` (or `413` when it is over `upload.max_file_size`).
//! 4. **Remote upload** ([`storage`]): the file is stored as a raw resource under
//!    `<folder>/<key_prefix>_<unix-millis>_<token>`; a provider failure is a generic `500`.
//! 5. **Response**: `200 {"file_url": "<secure url>"}`.
//!
//! ### Core Components
//!
//! The **configuration** ([`config`]) is read once at startup from a YAML file and environment
//! variables and validated before anything else starts.
//!
//! The **storage layer** ([`storage`]) hides the object store behind the [`StorageProvider`]
//! trait. Cloudinary is the production backend; an in-memory backend is available for local
//! development.
//!
//! **Errors** ([`errors`]) carry their HTTP mapping with them, so handlers simply return
//! `Result<T, Error>`.
//!
//! ## Getting Started
//!
//! ```no_run
//! use card_upload::{Application, Config, telemetry};
//!
//! # async fn example(config: Config) -> anyhow::Result<()> {
//! telemetry::init_telemetry(config.enable_otel_export)?;
//! let app = Application::new(config)?;
//! app.serve(async { tokio::signal::ctrl_c().await.unwrap_or(()) }).await?;
//! # Ok(())
//! # }
//! ```
pub mod api;
pub mod auth;
pub mod config;
pub mod errors;
mod metrics;
pub mod openapi;
pub mod storage;
pub mod telemetry;
mod types;

#[cfg(test)]
pub mod test_utils;

use crate::auth::ShopifyContext;
use crate::storage::StorageProvider;
use axum::extract::DefaultBodyLimit;
use axum::{Router, routing::get, routing::post};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
pub use config::Config;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, debug, info};

/// Headroom above `upload.max_file_size` for multipart boundaries, part headers and text fields.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Application state shared across all request handlers.
///
/// Everything in here is built once at startup and only read afterwards.
///
/// # Example
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .shopify(Arc::new(ShopifyContext::from_config(&config.shopify)))
///     .storage(storage)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub shopify: Arc<ShopifyContext>,
    pub storage: Arc<dyn StorageProvider>,
}

/// Build the application router.
///
/// Mounts the upload endpoint at `upload.path`, plus `/healthz`, `/api-docs/openapi.json` and,
/// with `enable_metrics`, `/internal/metrics`.
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.upload.max_file_size.saturating_add(MULTIPART_OVERHEAD);

    let upload_route = post(api::handlers::upload::upload_card)
        .fallback(api::handlers::upload::method_not_allowed)
        .layer(DefaultBodyLimit::max(body_limit));

    let mut router = Router::new()
        .route(&state.config.upload.path, upload_route)
        .route("/healthz", get(api::handlers::health::healthz))
        .route("/api-docs/openapi.json", get(openapi::openapi_json))
        .with_state(state.clone());

    // Add Prometheus metrics if enabled
    if state.config.enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();

        router = router
            .route("/internal/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    )
}

/// Main application struct that owns the router and configuration.
///
/// # Lifecycle
///
/// 1. **Create**: [`Application::new`] builds the Shopify verification context and the storage
///    provider from configuration, exactly once
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and starts handling requests
/// 3. **Shutdown**: When the shutdown future resolves, in-flight requests finish and telemetry
///    is flushed
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting card upload service with configuration: {:#?}", config);

        let storage = storage::create_provider(&config.storage)?;
        info!(provider = storage.name(), "Storage provider ready");

        Ok(Self::with_storage(config, storage))
    }

    /// Create an application around an already constructed storage provider.
    pub fn with_storage(config: Config, storage: Arc<dyn StorageProvider>) -> Self {
        let shopify = ShopifyContext::from_config(&config.shopify);
        info!(
            api_key = shopify.api_key(),
            host_name = shopify.host_name(),
            api_version = shopify.api_version(),
            "Shopify request verification ready"
        );

        let state = AppState::builder()
            .shopify(Arc::new(shopify))
            .storage(storage)
            .config(config.clone())
            .build();

        Self {
            router: build_router(state),
            config,
        }
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "Card upload service listening on http://{}, uploads accepted at {}",
            bind_addr, self.config.upload.path
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
