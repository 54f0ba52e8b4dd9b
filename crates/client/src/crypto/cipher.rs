//! AES-256-GCM-SIV encryption of payload text with secret rotation.
//!
//! **Algorithm choice:** AES-256-GCM-SIV (RFC 8452) authenticates the
//! ciphertext, so decrypting under the wrong key is detected rather than
//! yielding garbage. That detection is what lets [`Encryptor::decrypt`] fall
//! back to the previous secret during a rotation.
//!
//! A fresh random nonce is drawn for every call; identical plaintexts
//! therefore produce different envelopes.

use aes_gcm_siv::{
    aead::{Aead, KeyInit, OsRng},
    Aes256GcmSiv, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use thiserror::Error;
use tracing::warn;

use super::secret::{DerivedKey, Secret};

/// Byte length of an AES-256 key (32 bytes = 256 bits).
pub const KEY_LEN: usize = 32;

/// Byte length of an AES-GCM-SIV nonce (12 bytes = 96 bits).
pub const NONCE_LEN: usize = 12;

/// Prefix that appears at the start of every envelope.
pub const VERSION_PREFIX: &str = "v1";

/// Separator between the envelope components.
const SEPARATOR: char = ':';

/// A parsed encrypted envelope.
///
/// The string representation is `v1:<base64url(nonce)>:<base64url(ciphertext+tag)>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Raw nonce bytes.
    pub nonce: [u8; NONCE_LEN],
    /// Raw ciphertext + authentication tag bytes.
    pub ciphertext: Vec<u8>,
}

impl Envelope {
    /// Encode this envelope to its canonical string representation.
    pub fn to_string_repr(&self) -> String {
        format!(
            "{VERSION_PREFIX}{SEPARATOR}{}{SEPARATOR}{}",
            URL_SAFE_NO_PAD.encode(self.nonce),
            URL_SAFE_NO_PAD.encode(&self.ciphertext),
        )
    }

    /// Parse an envelope string.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::InvalidFormat`] if the string does not match the
    /// expected `v1:<nonce>:<ciphertext>` structure.
    pub fn parse(s: &str) -> Result<Self, CipherError> {
        let mut parts = s.trim().splitn(3, SEPARATOR);
        let (Some(version), Some(nonce_b64), Some(ct_b64)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(CipherError::InvalidFormat);
        };
        if version != VERSION_PREFIX {
            return Err(CipherError::InvalidFormat);
        }

        let nonce_bytes = URL_SAFE_NO_PAD
            .decode(nonce_b64)
            .map_err(|_| CipherError::InvalidFormat)?;
        let nonce: [u8; NONCE_LEN] = nonce_bytes
            .try_into()
            .map_err(|_| CipherError::InvalidFormat)?;

        let ciphertext = URL_SAFE_NO_PAD
            .decode(ct_b64)
            .map_err(|_| CipherError::InvalidFormat)?;
        if ciphertext.is_empty() {
            return Err(CipherError::InvalidFormat);
        }

        Ok(Self { nonce, ciphertext })
    }
}

/// Errors produced by the cipher layer.
#[derive(Debug, Error)]
pub enum CipherError {
    /// No encryption secret is configured.
    #[error("no encryption secret configured")]
    NoSecret,

    /// The envelope string does not match the expected format.
    #[error("invalid encrypted envelope format")]
    InvalidFormat,

    /// The ciphertext failed authentication under every configured key.
    #[error("decryption failed: ciphertext is corrupt or was encrypted under an unknown secret")]
    Authentication,

    /// The decrypted bytes are not valid UTF-8 text.
    #[error("decrypted payload is not valid UTF-8")]
    InvalidUtf8,

    /// AES-GCM-SIV encryption failed.
    #[error("aead encryption failed")]
    EncryptionFailure,
}

/// Encrypts outbound payloads and decrypts inbound ones.
///
/// Holds the key derived from the current secret and, while a rotation is in
/// progress, the key derived from the previous one. Immutable after
/// construction and safe to share between threads.
#[derive(Debug, Clone)]
pub struct Encryptor {
    current: Option<DerivedKey>,
    previous: Option<DerivedKey>,
}

impl Encryptor {
    /// Build an encryptor for `current`, accepting `previous` on decryption.
    ///
    /// An empty secret counts as not configured.
    pub fn new(current: &Secret, previous: Option<&Secret>) -> Self {
        Self {
            current: (!current.is_empty()).then(|| current.derive_key()),
            previous: previous
                .filter(|s| !s.is_empty())
                .map(Secret::derive_key),
        }
    }

    /// An encryptor with no secret; every operation fails with [`CipherError::NoSecret`].
    pub fn unconfigured() -> Self {
        Self {
            current: None,
            previous: None,
        }
    }

    /// Returns `true` if a previous secret is accepted for decryption.
    pub fn is_rotating(&self) -> bool {
        self.previous.is_some()
    }

    /// Encrypt `plaintext` under the current secret and return the envelope string.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::NoSecret`] if no secret is configured, or
    /// [`CipherError::EncryptionFailure`] on an internal AEAD error.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let key = self.current.as_ref().ok_or(CipherError::NoSecret)?;
        let cipher = build_cipher(key)?;

        use aes_gcm_siv::aead::rand_core::RngCore;
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|_| CipherError::EncryptionFailure)?;

        Ok(Envelope {
            nonce: nonce_bytes,
            ciphertext,
        }
        .to_string_repr())
    }

    /// Decrypt an envelope string back to plaintext.
    ///
    /// Tries the current secret first. Only when that fails authentication and
    /// a previous secret is configured is the previous secret tried. A
    /// malformed envelope fails immediately without trying any key.
    ///
    /// # Errors
    ///
    /// - [`CipherError::NoSecret`] if no secret is configured.
    /// - [`CipherError::InvalidFormat`] if `envelope` is not a `v1` envelope.
    /// - [`CipherError::Authentication`] if no configured key authenticates it.
    /// - [`CipherError::InvalidUtf8`] if the plaintext is not UTF-8.
    pub fn decrypt(&self, envelope: &str) -> Result<String, CipherError> {
        let current = self.current.as_ref().ok_or(CipherError::NoSecret)?;
        let envelope = Envelope::parse(envelope)?;

        let plaintext = match open(&envelope, current) {
            Ok(p) => p,
            Err(CipherError::Authentication) => {
                let previous = self.previous.as_ref().ok_or(CipherError::Authentication)?;
                let p = open(&envelope, previous)?;
                warn!("payload decrypted with previous secret");
                p
            }
            Err(e) => return Err(e),
        };

        String::from_utf8(plaintext).map_err(|_| CipherError::InvalidUtf8)
    }
}

fn open(envelope: &Envelope, key: &DerivedKey) -> Result<Vec<u8>, CipherError> {
    build_cipher(key)?
        .decrypt(Nonce::from_slice(&envelope.nonce), envelope.ciphertext.as_ref())
        .map_err(|_| CipherError::Authentication)
}

fn build_cipher(key: &DerivedKey) -> Result<Aes256GcmSiv, CipherError> {
    Aes256GcmSiv::new_from_slice(&key.0[..]).map_err(|_| CipherError::EncryptionFailure)
}
