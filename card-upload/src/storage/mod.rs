//! Object storage abstraction.
//!
//! This module defines the `StorageProvider` trait which abstracts the remote object store the
//! uploaded PDFs are forwarded to. Cloudinary is the production backend; the in-memory backend
//! exists for local development and tests.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use uuid::Uuid;

use crate::config::{StorageConfig, StorageProviderKind};

pub mod cloudinary;
pub mod memory;

/// Create a storage provider from configuration
///
/// This is the single point where we convert config into provider instances.
/// It is called once at startup; the provider is shared by every request afterwards.
pub fn create_provider(config: &StorageConfig) -> anyhow::Result<Arc<dyn StorageProvider>> {
    let provider: Arc<dyn StorageProvider> = match config.provider {
        StorageProviderKind::Cloudinary => Arc::new(cloudinary::CloudinaryProvider::new(config.cloudinary.clone())?),
        StorageProviderKind::Memory => Arc::new(memory::MemoryProvider::new(config.memory.base_url.clone())),
    };
    Ok(provider)
}

/// Result type for storage provider operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur while storing an object
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage provider rejected upload ({status}): {message}")]
    Provider { status: u16, message: String },

    #[error("Storage provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid storage provider response: {0}")]
    InvalidResponse(String),
}

/// How the provider should treat the stored bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    /// Opaque binary: no image or video transcoding.
    Raw,
}

impl ResourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceType::Raw => "raw",
        }
    }
}

/// Destination of an uploaded object: `<folder>/<name>`.
///
/// Names combine the upload time in unix milliseconds with a random token, so two uploads in the
/// same millisecond still get distinct keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    folder: String,
    name: String,
}

impl ObjectKey {
    pub fn generate(folder: &str, prefix: &str) -> Self {
        let millis = Utc::now().timestamp_millis();
        let token = Uuid::new_v4().simple().to_string();
        Self {
            folder: folder.to_string(),
            name: format!("{prefix}_{millis}_{}", &token[..8]),
        }
    }

    pub fn folder(&self) -> &str {
        &self.folder
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Provider-side identifier, e.g. `cards/card_1718000000000_3f9a0c1e`.
    pub fn public_id(&self) -> String {
        format!("{}/{}", self.folder, self.name)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.folder, self.name)
    }
}

/// A fully buffered file on its way to the provider.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub key: ObjectKey,
    pub data: Bytes,
    /// File name supplied by the client, if any
    pub file_name: Option<String>,
    pub resource_type: ResourceType,
}

/// Result of a successful upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// HTTPS URL of the stored object, exactly as reported by the provider
    pub secure_url: String,
    pub public_id: String,
}

/// Abstract object storage interface
///
/// Implementors upload a buffered file under the given key and report where it can be fetched.
/// Uploads are attempted once; retrying is left to the caller.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Short provider name used in logs and error messages
    fn name(&self) -> &'static str;

    /// Store the file and return its public location
    async fn upload(&self, request: UploadRequest) -> Result<StoredObject>;
}
