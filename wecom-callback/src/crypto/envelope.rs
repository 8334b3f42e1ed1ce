//! AES-256-CBC message envelopes.
//!
//! Plaintext layout after decryption:
//!
//! ```text
//! [0, 16)       random bytes
//! [16, 20)      big-endian u32 payload length L
//! [20, 20 + L)  payload
//! [20 + L, end) receiver id
//! ```
//!
//! The key is the base64-decoded `EncodingAESKey` and the IV is its first
//! 16 bytes. Padding is PKCS#7 over 32-byte blocks, so pad values run from
//! 1 to 32 even though the cipher block is 16 bytes.

use aes::Aes256;
use base64::{
    alphabet,
    engine::{general_purpose::STANDARD, DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine as _,
};
use cbc::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use super::{Credentials, CryptoError};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Raw AES key length in bytes.
pub const KEY_LEN: usize = 32;

const IV_LEN: usize = 16;
const BLOCK_SIZE: usize = 16;
const PAD_BLOCK_SIZE: usize = 32;
const RANDOM_PREFIX_LEN: usize = 16;
const HEADER_LEN: usize = RANDOM_PREFIX_LEN + 4;

/// Keys are handed out as 43 characters without `=` padding, and the last
/// character does not always leave its unused bits at zero.
const KEY_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decoded 32-byte AES key.
#[derive(Clone, PartialEq, Eq)]
pub struct AesKey([u8; KEY_LEN]);

impl AesKey {
    /// Decode an `EncodingAESKey`.
    pub fn from_encoding_key(encoding_key: &str) -> Result<Self, CryptoError> {
        let decoded = KEY_ENGINE
            .decode(encoding_key.trim())
            .map_err(|e| CryptoError::KeyFormatInvalid(format!("base64: {}", e)))?;

        let key: [u8; KEY_LEN] = decoded.as_slice().try_into().map_err(|_| {
            CryptoError::KeyFormatInvalid(format!(
                "decoded to {} bytes, expected {}",
                decoded.len(),
                KEY_LEN
            ))
        })?;

        Ok(Self(key))
    }

    fn iv(&self) -> &[u8] {
        &self.0[..IV_LEN]
    }
}

/// Decrypt a base64 ciphertext into the raw plaintext envelope.
pub fn decrypt(key: &AesKey, ciphertext_b64: &str) -> Result<Vec<u8>, CryptoError> {
    let ciphertext = STANDARD
        .decode(ciphertext_b64)
        .map_err(|e| CryptoError::CiphertextFormatInvalid(format!("base64: {}", e)))?;

    if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(CryptoError::CiphertextFormatInvalid(format!(
            "length {} is not a positive multiple of {}",
            ciphertext.len(),
            BLOCK_SIZE
        )));
    }

    let padded = Aes256CbcDec::new_from_slices(&key.0, key.iv())
        .map_err(|e| CryptoError::KeyFormatInvalid(e.to_string()))?
        .decrypt_padded_vec_mut::<NoPadding>(&ciphertext)
        .map_err(|e| CryptoError::CiphertextFormatInvalid(e.to_string()))?;

    unpad(padded)
}

/// Encrypt a raw plaintext envelope and base64-encode it.
pub fn encrypt(key: &AesKey, plaintext: &[u8]) -> Result<String, CryptoError> {
    let ciphertext = Aes256CbcEnc::new_from_slices(&key.0, key.iv())
        .map_err(|e| CryptoError::KeyFormatInvalid(e.to_string()))?
        .encrypt_padded_vec_mut::<NoPadding>(&pad(plaintext));

    Ok(STANDARD.encode(ciphertext))
}

/// PKCS#7 pad to a multiple of 32 bytes.
fn pad(plaintext: &[u8]) -> Vec<u8> {
    let pad_len = PAD_BLOCK_SIZE - plaintext.len() % PAD_BLOCK_SIZE;

    let mut padded = Vec::with_capacity(plaintext.len() + pad_len);
    padded.extend_from_slice(plaintext);
    padded.resize(plaintext.len() + pad_len, pad_len as u8);
    padded
}

/// Strip PKCS#7 padding of 1 to 32 bytes, all equal to the pad length.
fn unpad(mut padded: Vec<u8>) -> Result<Vec<u8>, CryptoError> {
    let pad_len = padded.last().copied().ok_or(CryptoError::PaddingInvalid)? as usize;

    if pad_len == 0 || pad_len > PAD_BLOCK_SIZE || pad_len > padded.len() {
        return Err(CryptoError::PaddingInvalid);
    }

    let start = padded.len() - pad_len;
    if padded[start..].iter().any(|&b| b as usize != pad_len) {
        return Err(CryptoError::PaddingInvalid);
    }

    padded.truncate(start);
    Ok(padded)
}

/// Frame a payload for `receiver_id` behind 16 fresh random bytes.
pub fn seal_envelope(payload: &[u8], receiver_id: &str) -> Result<Vec<u8>, CryptoError> {
    let payload_len = u32::try_from(payload.len()).map_err(|_| {
        CryptoError::EnvelopeInvalid(format!("payload of {} bytes is too long", payload.len()))
    })?;

    let mut envelope = Vec::with_capacity(HEADER_LEN + payload.len() + receiver_id.len());
    envelope.extend_from_slice(&rand::random::<[u8; RANDOM_PREFIX_LEN]>());
    envelope.extend_from_slice(&payload_len.to_be_bytes());
    envelope.extend_from_slice(payload);
    envelope.extend_from_slice(receiver_id.as_bytes());

    Ok(envelope)
}

/// Unframe a decrypted envelope, checking the embedded receiver id.
pub fn open_envelope(envelope: &[u8], receiver_id: &str) -> Result<String, CryptoError> {
    if envelope.len() < HEADER_LEN {
        return Err(CryptoError::EnvelopeInvalid(format!(
            "{} bytes is shorter than the {} byte header",
            envelope.len(),
            HEADER_LEN
        )));
    }

    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&envelope[RANDOM_PREFIX_LEN..HEADER_LEN]);
    let payload_len = u32::from_be_bytes(len_bytes) as usize;

    let body = &envelope[HEADER_LEN..];
    if payload_len > body.len() {
        return Err(CryptoError::EnvelopeInvalid(format!(
            "length prefix {} exceeds the remaining {} bytes",
            payload_len,
            body.len()
        )));
    }

    let (payload, embedded_receiver) = body.split_at(payload_len);
    if embedded_receiver != receiver_id.as_bytes() {
        return Err(CryptoError::ReceiverIdMismatch);
    }

    String::from_utf8(payload.to_vec())
        .map_err(|e| CryptoError::EnvelopeInvalid(format!("payload is not UTF-8: {}", e)))
}

/// Decode a base64 ciphertext into its payload.
///
/// The key is decoded on every call, so a malformed key surfaces as
/// [`CryptoError::KeyFormatInvalid`] per request instead of at startup.
pub fn decode(ciphertext_b64: &str, credentials: &Credentials) -> Result<String, CryptoError> {
    let key = AesKey::from_encoding_key(&credentials.encoding_key)?;
    let envelope = decrypt(&key, ciphertext_b64)?;
    open_envelope(&envelope, &credentials.receiver_id)
}

/// Encode a payload into a base64 ciphertext for `credentials.receiver_id`.
pub fn encode(payload: &str, credentials: &Credentials) -> Result<String, CryptoError> {
    let key = AesKey::from_encoding_key(&credentials.encoding_key)?;
    let envelope = seal_envelope(payload.as_bytes(), &credentials.receiver_id)?;
    encrypt(&key, &envelope)
}
