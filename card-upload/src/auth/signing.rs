//! HMAC-SHA256 signing of Shopify query strings.
//!
//! Shopify signs the query string of requests it sends to (or on behalf of) an app:
//! - Drop the `hmac` parameter (and the legacy `signature` parameter)
//! - Sort the remaining pairs by key
//! - Form-urlencode them as `k=v` joined with `&`
//! - The signature is the lower-case hex HMAC-SHA256 of that string, keyed with the app secret
//!
//! See: <https://shopify.dev/docs/apps/build/authentication-authorization/access-tokens/authorization-code-grant>

use hmac::{Hmac, Mac};
use sha2::Sha256;
use url::form_urlencoded;

type HmacSha256 = Hmac<Sha256>;

/// Query parameters that carry a signature and are therefore not part of the signed message.
pub const SIGNATURE_PARAMS: [&str; 2] = ["hmac", "signature"];

/// Build the message Shopify signs from a set of query parameters.
pub fn canonical_query<K, V>(params: &[(K, V)]) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut pairs: Vec<(&str, &str)> = params
        .iter()
        .map(|(key, value)| (key.as_ref(), value.as_ref()))
        .filter(|(key, _)| !SIGNATURE_PARAMS.contains(key))
        .collect();
    pairs.sort();

    form_urlencoded::Serializer::new(String::new()).extend_pairs(pairs).finish()
}

/// Sign query parameters with the app secret.
///
/// Returns the hex digest to send as the `hmac` parameter, or `None` if the key is rejected.
pub fn sign_query<K, V>(params: &[(K, V)], secret: &[u8]) -> Option<String>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(canonical_query(params).as_bytes());
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Verify the `hmac` value a caller supplied for the given query parameters.
///
/// The comparison is constant time. Only lower-case hex, as Shopify sends it, can verify.
pub fn verify_query<K, V>(params: &[(K, V)], signature: &str, secret: &[u8]) -> bool
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    if signature.bytes().any(|b| b.is_ascii_uppercase()) {
        return false;
    }
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };

    mac.update(canonical_query(params).as_bytes());
    mac.verify_slice(&expected).is_ok()
}
