//! Common type definitions.
//!
//! # Secrets
//!
//! Credentials loaded from configuration (the Shopify shared secret, the Cloudinary API secret)
//! are wrapped in [`Secret`]. The configuration is logged at startup, so its `Debug` and
//! `Serialize` output must never contain the wrapped value. Call [`Secret::expose`] at the point
//! where the raw value is actually needed (signing a request).

use std::fmt::{self, Debug, Display, Formatter};

use serde::{Deserialize, Serialize, Serializer};

/// A configuration value that must not appear in logs or serialized output.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret<T>(T);

impl<T> Secret<T>
where
    T: AsRef<str>,
{
    pub fn expose(&self) -> &T {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.as_ref().trim().is_empty()
    }
}

impl<T> From<T> for Secret<T> {
    fn from(value: T) -> Self {
        Self(value)
    }
}

impl<T> Serialize for Secret<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str("*****")
    }
}

impl<T> Debug for Secret<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("*****")
    }
}

impl<T> Display for Secret<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("*****")
    }
}
