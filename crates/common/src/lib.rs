//! Wire protocol definitions and transport errors shared across `shq` crates.

pub mod error;
pub mod protocol;

pub use error::TransportError;
