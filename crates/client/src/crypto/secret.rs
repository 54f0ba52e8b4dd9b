//! [`Secret`] and the key material derived from it.

use serde::Deserialize;
use sha2::{Digest, Sha256};

use super::cipher::KEY_LEN;

/// Operator-supplied secret text, as read from configuration.
///
/// Immutable once loaded. Never printed: `Debug` is redacted.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Wrap secret text.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Raw secret bytes.
    pub fn expose(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Returns `true` if the secret is the empty string.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Derive the 256-bit AES key for this secret.
    pub(crate) fn derive_key(&self) -> DerivedKey {
        let digest = Sha256::digest(self.expose());
        let mut buf = Box::new([0u8; KEY_LEN]);
        buf.copy_from_slice(&digest);
        DerivedKey(buf)
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret([REDACTED])")
    }
}

/// Fixed-size AES key derived from a [`Secret`] as `SHA-256(secret)`.
///
/// Overwritten with zeroes on drop.
#[derive(Clone)]
pub(crate) struct DerivedKey(pub(crate) Box<[u8; KEY_LEN]>);

impl Drop for DerivedKey {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DerivedKey([REDACTED])")
    }
}
