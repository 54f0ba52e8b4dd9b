//! Payload encryption and callback signing.
//!
//! This module is free of HTTP dependencies. It provides the two primitives the
//! client layers on top of the wire protocol:
//!
//! - [`Encryptor`]: AES-256-GCM-SIV with a current and an optional previous
//!   secret, so a secret can be rotated while messages encrypted under the old
//!   one are still in flight.
//! - [`sign`] / [`verify`]: HMAC-SHA256 over the raw payload text, keyed with
//!   the client token.
//!
//! # Envelope format
//!
//! ```text
//! v1:<base64url-no-pad(nonce)>:<base64url-no-pad(ciphertext+tag)>
//! ```
//!
//! The `v1` prefix leaves room for a future algorithm or key-derivation change
//! without breaking existing ciphertext.

pub mod cipher;
pub mod secret;
pub mod signature;

pub use cipher::{CipherError, Encryptor, KEY_LEN};
pub use secret::Secret;
pub use signature::{sign, verify};
