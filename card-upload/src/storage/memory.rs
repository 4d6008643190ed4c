//! In-memory storage provider
//!
//! Keeps every upload in a concurrent map and hands back a URL under the configured base.
//! Nothing survives a restart. Useful for development and for exercising the endpoint without
//! storage credentials.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use url::Url;

use crate::storage::{Result, StorageProvider, StoredObject, UploadRequest};

pub struct MemoryProvider {
    base_url: Url,
    objects: DashMap<String, Bytes>,
}

impl MemoryProvider {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            objects: DashMap::new(),
        }
    }

    pub fn url_for(&self, public_id: &str) -> String {
        format!("{}/{}", self.base_url.as_str().trim_end_matches('/'), public_id)
    }

    pub fn get(&self, public_id: &str) -> Option<Bytes> {
        self.objects.get(public_id).map(|entry| entry.value().clone())
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl StorageProvider for MemoryProvider {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn upload(&self, request: UploadRequest) -> Result<StoredObject> {
        let public_id = request.key.public_id();
        let secure_url = self.url_for(&public_id);

        tracing::debug!(public_id = %public_id, size = request.data.len(), "Stored object in memory");
        self.objects.insert(public_id.clone(), request.data);

        Ok(StoredObject { secure_url, public_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ObjectKey, ResourceType};

    fn request(data: &'static [u8]) -> UploadRequest {
        UploadRequest {
            key: ObjectKey::generate("cards", "card"),
            data: Bytes::from_static(data),
            file_name: Some("card.pdf".to_string()),
            resource_type: ResourceType::Raw,
        }
    }

    #[tokio::test]
    async fn test_upload_and_fetch() {
        let provider = MemoryProvider::new(Url::parse("https://files.example.com/objects/").unwrap());
        assert!(provider.is_empty());

        let req = request(b"%PDF-1.7");
        let public_id = req.key.public_id();
        let stored = provider.upload(req).await.unwrap();

        assert_eq!(stored.public_id, public_id);
        assert_eq!(stored.secure_url, format!("https://files.example.com/objects/{public_id}"));
        assert_eq!(provider.get(&public_id).unwrap(), Bytes::from_static(b"%PDF-1.7"));
        assert_eq!(provider.len(), 1);
    }

    #[tokio::test]
    async fn test_uploads_do_not_overwrite_each_other() {
        let provider = MemoryProvider::new(Url::parse("http://localhost:3000/objects").unwrap());

        provider.upload(request(b"first")).await.unwrap();
        provider.upload(request(b"second")).await.unwrap();

        assert_eq!(provider.keys().len(), 2);
    }
}
