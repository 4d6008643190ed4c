//! Request authentication.
//!
//! Upload requests are not made by logged-in users but by a Shopify storefront, which signs the
//! query string with the app's shared secret. A request is authenticated when:
//! - `shop`, `timestamp` and `hmac` are all present and non-empty
//! - `hmac` matches the HMAC-SHA256 of the remaining parameters (see [`signing`])
//! - `timestamp` falls within `shopify.max_timestamp_age` of now, when that window is configured
//!
//! Every failure produces the same [`Error::Unauthenticated`](crate::errors::Error::Unauthenticated)
//! so callers cannot tell which check rejected them.
//!
//! Handlers opt in by taking a [`ShopifyRequest`] argument.

pub mod shopify;
pub mod signing;

pub use shopify::{ShopifyContext, ShopifyRequest};
