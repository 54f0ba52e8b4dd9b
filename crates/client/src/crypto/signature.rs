//! HMAC-SHA256 signatures over payload text.
//!
//! The service signs every callback body with the client's token; the
//! receiving application recomputes the tag with [`verify`] before trusting
//! the body. Signatures are lowercase hex.

use hmac::{
    digest::{Key, KeyInit},
    Hmac, Mac,
};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Compute the hex HMAC-SHA256 of `payload` keyed with `secret`.
///
/// Deterministic: the same `(payload, secret)` always yields the same string,
/// so the remote party can recompute and compare it.
pub fn sign(payload: &str, secret: &str) -> String {
    hex::encode(mac(payload, secret).finalize().into_bytes())
}

/// Check `signature` against the HMAC of `payload` under `secret`.
///
/// The tag comparison is constant-time. Returns `false` for any mismatch,
/// including a signature that is not valid hex or has the wrong length.
pub fn verify(payload: &str, secret: &str, signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    mac(payload, secret).verify_slice(&expected).is_ok()
}

fn mac(payload: &str, secret: &str) -> HmacSha256 {
    let mut mac = <HmacSha256 as KeyInit>::new(&key_block(secret.as_bytes()));
    mac.update(payload.as_bytes());
    mac
}

/// HMAC key block: keys longer than the block are hashed first, then the key
/// is zero-padded to the full block.
fn key_block(secret: &[u8]) -> Key<HmacSha256> {
    let mut block = Key::<HmacSha256>::default();
    if secret.len() > block.len() {
        let digest = Sha256::digest(secret);
        block[..digest.len()].copy_from_slice(&digest);
    } else {
        block[..secret.len()].copy_from_slice(secret);
    }
    block
}
