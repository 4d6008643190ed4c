//! API layer for HTTP request handling and data models.
//!
//! This module contains the HTTP surface, organized into:
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: Response bodies shared by the handlers and the OpenAPI document
//!
//! # API Structure
//!
//! - **Upload** (`POST /api/upload`): signed PDF upload, forwarded to object storage
//! - **Health** (`GET /healthz`): liveness probe
//!
//! # OpenAPI Documentation
//!
//! Endpoints are documented with `utoipa` annotations. The document is served at
//! `/api-docs/openapi.json`.

pub mod handlers;
pub mod models;
