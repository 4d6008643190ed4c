use std::time::Duration;

use axum::{extract::FromRequestParts, http::request::Parts};
use chrono::{DateTime, Utc};
use tracing::{debug, instrument};
use url::form_urlencoded;

use crate::{
    AppState,
    auth::signing,
    config::{Secret, ShopifyConfig},
    errors::{Error, Result},
};

/// Verification context for requests signed by Shopify.
///
/// Built once at startup from [`ShopifyConfig`] and shared read-only by every request.
#[derive(Debug, Clone)]
pub struct ShopifyContext {
    api_key: String,
    api_secret: Secret<String>,
    host_name: String,
    api_version: String,
    max_timestamp_age: Option<Duration>,
}

/// A request whose query string carried a valid Shopify signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShopifyRequest {
    /// The `*.myshopify.com` domain the request was made for
    pub shop: String,
    /// The signed `timestamp` value, as sent
    pub timestamp: String,
}

impl ShopifyContext {
    pub fn from_config(config: &ShopifyConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            host_name: config.host_name.clone(),
            api_version: config.api_version.clone(),
            max_timestamp_age: config.max_timestamp_age,
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    /// Check `hmac` against the remaining query parameters.
    pub fn verify(&self, params: &[(String, String)], hmac: &str) -> bool {
        signing::verify_query(params, hmac, self.api_secret.expose().as_bytes())
    }

    /// Whether `timestamp` (unix seconds) is within the configured window around `now`.
    ///
    /// Always true when no window is configured.
    pub fn is_fresh(&self, timestamp: &str, now: DateTime<Utc>) -> bool {
        let Some(max_age) = self.max_timestamp_age else {
            return true;
        };
        let Ok(signed_at) = timestamp.parse::<i64>() else {
            return false;
        };

        now.timestamp().abs_diff(signed_at) <= max_age.as_secs()
    }

    /// Authenticate a request from its decoded query parameters.
    ///
    /// Missing parameters, a bad signature and a stale timestamp all fail with the same
    /// [`Error::Unauthenticated`].
    pub fn authenticate(&self, params: &[(String, String)], now: DateTime<Utc>) -> Result<ShopifyRequest> {
        let (Some(shop), Some(timestamp), Some(hmac)) = (
            first_non_empty(params, "shop"),
            first_non_empty(params, "timestamp"),
            first_non_empty(params, "hmac"),
        ) else {
            debug!("Missing shop, timestamp or hmac query parameter");
            return Err(Error::Unauthenticated);
        };

        if !self.verify(params, hmac) {
            debug!(shop = %shop, "Query signature did not verify");
            return Err(Error::Unauthenticated);
        }

        if !self.is_fresh(timestamp, now) {
            debug!(shop = %shop, timestamp = %timestamp, "Signed timestamp outside allowed window");
            return Err(Error::Unauthenticated);
        }

        Ok(ShopifyRequest {
            shop: shop.to_string(),
            timestamp: timestamp.to_string(),
        })
    }
}

fn first_non_empty<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
        .filter(|value| !value.is_empty())
}

/// Decode a raw query string into its key/value pairs, preserving order and duplicates.
pub fn parse_query(query: Option<&str>) -> Vec<(String, String)> {
    query
        .map(|q| form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default()
}

impl FromRequestParts<AppState> for ShopifyRequest {
    type Rejection = Error;

    #[instrument(skip(parts, state))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let params = parse_query(parts.uri.query());
        state.shopify.authenticate(&params, Utc::now())
    }
}
