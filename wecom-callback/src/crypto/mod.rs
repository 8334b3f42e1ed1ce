//! Callback cryptography for the WeCom protocol.
//!
//! Two pieces, both pure and synchronous:
//! - [`signature`]: SHA-1 over the sorted token/timestamp/nonce(/payload) set
//! - [`envelope`]: AES-256-CBC envelope carrying a length-prefixed payload
//!   and the receiver id
//!
//! ## Flow
//!
//! ```text
//! query fields → signature::verify → envelope::decode → plaintext payload
//! ```

pub mod envelope;
pub mod signature;

use std::fmt;

use thiserror::Error;

pub use envelope::{decode, encode, AesKey};
pub use signature::{compute_signature, verify};

/// Shared secrets configured out-of-band with the platform.
///
/// Immutable after construction; handlers share one instance behind an `Arc`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Callback token used in the request signature
    pub token: String,
    /// Base64 `EncodingAESKey` (43 chars unpadded, or 44 padded)
    pub encoding_key: String,
    /// Corp id (or suite id) embedded in every envelope
    pub receiver_id: String,
}

impl Credentials {
    pub fn new(
        token: impl Into<String>,
        encoding_key: impl Into<String>,
        receiver_id: impl Into<String>,
    ) -> Self {
        Self {
            token: token.into(),
            encoding_key: encoding_key.into(),
            receiver_id: receiver_id.into(),
        }
    }
}

// Secrets stay out of Debug output so a stray `?credentials` never leaks them.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"<redacted>")
            .field("encoding_key", &"<redacted>")
            .field("receiver_id", &self.receiver_id)
            .finish()
    }
}

/// Failures while decoding or encoding a message envelope.
///
/// All of these point at a credentials or configuration problem on one side
/// of the exchange, as opposed to a forged request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("encoding key is invalid: {0}")]
    KeyFormatInvalid(String),

    #[error("ciphertext is invalid: {0}")]
    CiphertextFormatInvalid(String),

    #[error("PKCS#7 padding is invalid")]
    PaddingInvalid,

    #[error("plaintext envelope is malformed: {0}")]
    EnvelopeInvalid(String),

    #[error("embedded receiver id does not match the configured one")]
    ReceiverIdMismatch,
}

impl CryptoError {
    /// Stable identifier used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::KeyFormatInvalid(_) => "key_format_invalid",
            Self::CiphertextFormatInvalid(_) => "ciphertext_format_invalid",
            Self::PaddingInvalid => "padding_invalid",
            Self::EnvelopeInvalid(_) => "envelope_invalid",
            Self::ReceiverIdMismatch => "receiver_id_mismatch",
        }
    }
}
