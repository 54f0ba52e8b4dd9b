//! Client library for the ServerlessHQ job-dispatch API.
//!
//! - [`Client::enqueue`], [`Client::nack`] and [`Client::nack_scheduled_task`]
//!   call the remote API.
//! - [`Client::verify_and_decrypt`] authenticates a callback body and recovers
//!   the payload it carries.
//!
//! Payloads are serialised with [`serializer`], which keeps dates and other
//! rich types intact, and encrypted with [`crypto::Encryptor`] when an
//! encryption secret is configured.

pub mod client;
pub mod config;
pub mod crypto;
pub mod serializer;
pub mod transport;

pub use client::{
    forwardable_headers, Client, ClientError, EnqueueArgs, NackArgs, NackScheduledTaskArgs,
};
pub use config::{ClientConfig, ConfigError};
pub use crypto::{CipherError, Encryptor, Secret};
pub use hyper::HeaderMap;
pub use serializer::{parse, stringify, ParseError, RegExp, Value};
pub use shq_common::TransportError;
pub use transport::{HttpTransport, Transport};
