use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Successful upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    /// Public HTTPS URL of the stored PDF, exactly as reported by the storage provider
    #[schema(example = "https://res.cloudinary.com/demo/raw/upload/v1718000000/cards/card_1718000000000_3f9a0c1e")]
    pub file_url: String,
}

/// Error body returned for every failed upload except 405
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    #[schema(example = "No PDF file uploaded")]
    pub error: String,
}
