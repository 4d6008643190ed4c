//! Application configuration management.
//!
//! Configuration is loaded once at startup from a YAML file with environment variable overrides.
//! The configuration file path defaults to `config.yaml` but can be specified via `-f` flag or
//! `CARD_UPLOAD_CONFIG` environment variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `CARD_UPLOAD_` override YAML values
//! 3. **Provider variables** - The conventional `SHOPIFY_API_KEY`, `SHOPIFY_API_SECRET`,
//!    `HOST_NAME`, `CLOUDINARY_CLOUD_NAME`, `CLOUDINARY_API_KEY` and `CLOUDINARY_API_SECRET`
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `CARD_UPLOAD_STORAGE__PROVIDER=memory` sets the `storage.provider` field.
//!
//! A missing credential is a startup error: [`Config::load`] validates the merged result and
//! the process refuses to serve traffic with an incomplete configuration.
//!
//! ## Usage
//!
//! ```no_run
//! use clap::Parser;
//! use card_upload::config::{Args, Config};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let args = Args::parse();
//! let config = Config::load(&args)?;
//!
//! println!("Server will bind to {}:{}", config.host, config.port);
//! # Ok(())
//! # }
//! ```
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! # Override server port
//! CARD_UPLOAD_PORT=8080
//!
//! # Shopify app credentials
//! SHOPIFY_API_KEY=...
//! SHOPIFY_API_SECRET=...
//! HOST_NAME=https://cards.example.com
//!
//! # Cloudinary credentials
//! CLOUDINARY_CLOUD_NAME=demo
//! CLOUDINARY_API_KEY=...
//! CLOUDINARY_API_SECRET=...
//!
//! # Reject signed requests older than five minutes
//! CARD_UPLOAD_SHOPIFY__MAX_TIMESTAMP_AGE=5m
//! ```

use std::time::Duration;

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use url::Url;

pub use crate::types::Secret;

/// Conventional environment variables and the config paths they populate.
const PROVIDER_ENV_VARS: &[(&str, &str)] = &[
    ("SHOPIFY_API_KEY", "shopify.api_key"),
    ("SHOPIFY_API_SECRET", "shopify.api_secret"),
    ("HOST_NAME", "shopify.host_name"),
    ("CLOUDINARY_CLOUD_NAME", "storage.cloudinary.cloud_name"),
    ("CLOUDINARY_API_KEY", "storage.cloudinary.api_key"),
    ("CLOUDINARY_API_SECRET", "storage.cloudinary.api_secret"),
];

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "CARD_UPLOAD_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// All fields have defaults defined in the `Default` implementation, except the credentials,
/// which default to empty and are rejected by [`Config::validate`].
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Shopify app credentials used to verify signed requests
    pub shopify: ShopifyConfig,
    /// Upload endpoint settings (path, object naming, size limit)
    pub upload: UploadConfig,
    /// Object storage backend
    pub storage: StorageConfig,
    /// Enable Prometheus metrics endpoint at `/internal/metrics`
    pub enable_metrics: bool,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
}

/// Shopify app settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShopifyConfig {
    /// App API key (client id)
    pub api_key: String,
    /// App shared secret; the HMAC key for signed query strings
    pub api_secret: Secret<String>,
    /// Public host name of this service, without scheme
    pub host_name: String,
    /// Admin API version the app was registered against
    pub api_version: String,
    /// Reject requests whose `timestamp` is further than this from the current time.
    /// Disabled when unset.
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub max_timestamp_age: Option<Duration>,
}

/// Upload endpoint settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadConfig {
    /// Route the upload endpoint is mounted at
    pub path: String,
    /// Logical folder objects are placed in
    pub folder: String,
    /// Prefix of generated object names (`<folder>/<key_prefix>_<millis>_<token>`)
    pub key_prefix: String,
    /// Largest accepted PDF, in bytes
    pub max_file_size: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageProviderKind {
    #[default]
    Cloudinary,
    /// Keeps uploads in process memory. For local development only.
    Memory,
}

/// Storage backend selection and per-provider settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub provider: StorageProviderKind,
    pub cloudinary: CloudinaryConfig,
    pub memory: MemoryStorageConfig,
}

/// Cloudinary upload API credentials.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: Secret<String>,
    /// Base URL of the upload API
    pub api_base_url: Url,
    /// Timeout for a single upload request
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Digest used for upload signatures. Must match the account's `signature_algorithm` setting.
    pub signature_algorithm: SignatureAlgorithm,
}

/// Digest Cloudinary signs API requests with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureAlgorithm {
    /// Cloudinary's default for new accounts
    #[default]
    Sha1,
    Sha256,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct MemoryStorageConfig {
    /// Base of the URLs handed back for stored objects
    pub base_url: Url,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            shopify: ShopifyConfig::default(),
            upload: UploadConfig::default(),
            storage: StorageConfig::default(),
            enable_metrics: false,
            enable_otel_export: false,
        }
    }
}

impl Default for ShopifyConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_secret: Secret::default(),
            host_name: String::new(),
            api_version: "2024-07".to_string(),
            max_timestamp_age: None,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            path: "/api/upload".to_string(),
            folder: "cards".to_string(),
            key_prefix: "card".to_string(),
            max_file_size: 10 * 1024 * 1024, // 10 MiB
        }
    }
}

impl Default for CloudinaryConfig {
    fn default() -> Self {
        Self {
            cloud_name: String::new(),
            api_key: String::new(),
            api_secret: Secret::default(),
            api_base_url: Url::parse("https://api.cloudinary.com").expect("static URL is valid"),
            timeout: Duration::from_secs(60),
            signature_algorithm: SignatureAlgorithm::default(),
        }
    }
}

impl Default for MemoryStorageConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse("http://localhost:3000/objects").expect("static URL is valid"),
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let mut config: Self = Self::figment(args).extract()?;

        config.shopify.host_name = strip_scheme(&config.shopify.host_name).to_string();

        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.shopify.api_key.trim().is_empty() {
            anyhow::bail!("Config validation: shopify.api_key is not configured. Set SHOPIFY_API_KEY or CARD_UPLOAD_SHOPIFY__API_KEY.");
        }
        if self.shopify.api_secret.is_empty() {
            anyhow::bail!(
                "Config validation: shopify.api_secret is not configured. Set SHOPIFY_API_SECRET or CARD_UPLOAD_SHOPIFY__API_SECRET."
            );
        }
        if self.shopify.host_name.trim().is_empty() {
            anyhow::bail!("Config validation: shopify.host_name is not configured. Set HOST_NAME or CARD_UPLOAD_SHOPIFY__HOST_NAME.");
        }

        if !self.upload.path.starts_with('/') {
            anyhow::bail!("Config validation: upload.path must start with '/', got {:?}", self.upload.path);
        }
        if self.upload.max_file_size == 0 {
            anyhow::bail!("Config validation: upload.max_file_size must be greater than zero");
        }
        if self.upload.folder.trim().is_empty() || self.upload.key_prefix.trim().is_empty() {
            anyhow::bail!("Config validation: upload.folder and upload.key_prefix must not be empty");
        }

        if self.storage.provider == StorageProviderKind::Cloudinary {
            let cloudinary = &self.storage.cloudinary;
            let missing: Vec<&str> = [
                ("cloud_name", cloudinary.cloud_name.trim().is_empty()),
                ("api_key", cloudinary.api_key.trim().is_empty()),
                ("api_secret", cloudinary.api_secret.is_empty()),
            ]
            .into_iter()
            .filter_map(|(name, is_missing)| is_missing.then_some(name))
            .collect();

            if !missing.is_empty() {
                anyhow::bail!(
                    "Config validation: Cloudinary storage is selected but storage.cloudinary.{{{}}} is not configured. \
                     Set the CLOUDINARY_* environment variables or choose another storage.provider.",
                    missing.join(", ")
                );
            }
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // The config path itself is read by clap, not part of the config tree
            .merge(Env::prefixed("CARD_UPLOAD_").ignore(&["CONFIG"]).split("__"))
            // Provider variables used by existing deployments
            .merge(Env::raw().filter_map(|key| {
                PROVIDER_ENV_VARS
                    .iter()
                    .find(|(name, _)| key.as_str().eq_ignore_ascii_case(name))
                    .map(|(_, path)| (*path).into())
            }))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn strip_scheme(host_name: &str) -> &str {
    host_name
        .strip_prefix("https://")
        .or_else(|| host_name.strip_prefix("http://"))
        .unwrap_or(host_name)
}
