//! Cloudinary storage provider
//!
//! Uploads go through the signed upload API:
//!
//! ```text
//! POST {api_base_url}/v1_1/{cloud_name}/{resource_type}/upload
//! ```
//!
//! as `multipart/form-data` with the file plus `api_key`, `timestamp`, `public_id`, `folder` and
//! `signature`. The signature is computed over the signed parameters (everything except `file`,
//! `api_key`, `resource_type` and `cloud_name`): sort them by name, join as `k=v` with `&`,
//! append the API secret and take the hex digest. The digest is SHA-1 unless the account has
//! been switched to SHA-256 (`storage.cloudinary.signature_algorithm`).
//!
//! See: <https://cloudinary.com/documentation/authentication_signatures>

use async_trait::async_trait;
use chrono::Utc;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::config::{CloudinaryConfig, SignatureAlgorithm};
use crate::storage::{Result, StorageError, StorageProvider, StoredObject, UploadRequest};

pub struct CloudinaryProvider {
    config: CloudinaryConfig,
    http_client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: Option<String>,
    public_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl CloudinaryProvider {
    pub fn new(config: CloudinaryConfig) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self { config, http_client })
    }

    fn upload_url(&self, resource_type: &str) -> String {
        format!(
            "{}/v1_1/{}/{}/upload",
            self.config.api_base_url.as_str().trim_end_matches('/'),
            self.config.cloud_name,
            resource_type
        )
    }
}

/// Sign upload parameters the way the Cloudinary API expects.
///
/// Returns the lower-case hex digest of `k1=v1&k2=v2...{api_secret}` with the pairs sorted by
/// key.
pub fn sign_params(params: &[(&str, &str)], api_secret: &str, algorithm: SignatureAlgorithm) -> String {
    let mut sorted = params.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let to_sign = sorted
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");

    match algorithm {
        SignatureAlgorithm::Sha1 => digest_hex::<Sha1>(&to_sign, api_secret),
        SignatureAlgorithm::Sha256 => digest_hex::<Sha256>(&to_sign, api_secret),
    }
}

fn digest_hex<D: Digest>(to_sign: &str, api_secret: &str) -> String {
    let mut hasher = D::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait]
impl StorageProvider for CloudinaryProvider {
    fn name(&self) -> &'static str {
        "cloudinary"
    }

    async fn upload(&self, request: UploadRequest) -> Result<StoredObject> {
        let timestamp = Utc::now().timestamp().to_string();
        let public_id = request.key.public_id();
        let folder = request.key.folder().to_string();

        let signature = sign_params(
            &[("folder", &folder), ("public_id", &public_id), ("timestamp", &timestamp)],
            self.config.api_secret.expose(),
            self.config.signature_algorithm,
        );

        let file_name = request
            .file_name
            .clone()
            .unwrap_or_else(|| format!("{}.pdf", request.key.name()));
        let size = request.data.len() as u64;
        let file_part = Part::stream_with_length(request.data, size).file_name(file_name);

        let form = Form::new()
            .part("file", file_part)
            .text("api_key", self.config.api_key.clone())
            .text("timestamp", timestamp)
            .text("public_id", public_id.clone())
            .text("folder", folder)
            .text("signature", signature);

        let url = self.upload_url(request.resource_type.as_str());
        tracing::debug!(url = %url, public_id = %public_id, size, "Sending upload to Cloudinary");

        let response = self.http_client.post(&url).multipart(form).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<ErrorResponse>(&body) {
                Ok(parsed) => parsed.error.message,
                Err(_) => body,
            };
            return Err(StorageError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: UploadResponse = response
            .json()
            .await
            .map_err(|e| StorageError::InvalidResponse(e.to_string()))?;

        let secure_url = parsed
            .secure_url
            .ok_or_else(|| StorageError::InvalidResponse("response has no secure_url".to_string()))?;

        tracing::info!(public_id = %public_id, "Cloudinary upload complete");

        Ok(StoredObject {
            secure_url,
            public_id: parsed.public_id.unwrap_or(public_id),
        })
    }
}
