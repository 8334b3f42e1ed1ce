//! Callback request signatures.
//!
//! The platform signs every callback with:
//! - `SHA1(sort(token, timestamp, nonce))` for the plain handshake
//! - `SHA1(sort(token, timestamp, nonce, encrypt))` once message encryption is on
//!
//! Sorting is plain byte-wise lexicographic order over the UTF-8 strings, and
//! the sorted parts are concatenated without a separator.
//! Reference: https://developer.work.weixin.qq.com/document/path/90968

use sha1::{Digest, Sha1};

use super::Credentials;

/// Compute the lowercase hex signature for a callback request.
///
/// `payload_field` is the `echostr` or `Encrypt` value when the four-part
/// variant is in use, `None` for the three-part variant. Values are hashed
/// exactly as given; percent-decoding is the caller's job.
pub fn compute_signature(
    token: &str,
    timestamp: &str,
    nonce: &str,
    payload_field: Option<&str>,
) -> String {
    let mut parts = Vec::with_capacity(4);
    parts.extend([token, timestamp, nonce]);
    parts.extend(payload_field);

    // `Ord` for `str` compares bytes, which is the dictionary order the platform uses
    parts.sort_unstable();

    let mut hasher = Sha1::new();
    for part in &parts {
        hasher.update(part.as_bytes());
    }

    hex::encode(hasher.finalize())
}

/// Verify a callback signature against the configured token.
///
/// Returns `false` on mismatch; never fails for well-formed strings.
pub fn verify(
    credentials: &Credentials,
    timestamp: &str,
    nonce: &str,
    payload_field: Option<&str>,
    provided_signature: &str,
) -> bool {
    let expected = compute_signature(&credentials.token, timestamp, nonce, payload_field);
    constant_time_compare(&expected, provided_signature)
}

/// Constant-time string comparison.
pub(crate) fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_golden_three_part_signature() {
        // sorted: ["1234567890", "test", "test"] -> "1234567890testtest"
        let signature = compute_signature("test", "1234567890", "test", None);

        assert_eq!(signature, "69de961a2f8016ab73e3ae075b52c4511a6cc5d4");
    }

    #[test]
    fn test_platform_sample_four_part_signature() {
        let echostr =
            "P9nAzCzyDtyTWESHep1vC5X9xho/qYX3Zpb4yKa9SKld1DsH3Iyt3tP3zNdtp+4RPcs8TgAE7OaBO+FZXvnaqQ==";
        let signature = compute_signature("QDG6eK", "1409659589", "263014780", Some(echostr));

        assert_eq!(signature, "5c45ff5e21c57e6ad56bac8758b79b1d9ac89fd3");
    }

    #[test]
    fn test_signature_ignores_field_order() {
        let a = compute_signature("token", "1700000000", "nonce-1", Some("cipher"));
        let b = compute_signature("cipher", "nonce-1", "token", Some("1700000000"));
        let c = compute_signature("nonce-1", "cipher", "1700000000", Some("token"));

        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn test_signature_is_lowercase_hex() {
        let signature = compute_signature("Token", "1", "2", None);

        assert_eq!(signature.len(), 40);
        assert!(signature
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn test_sort_is_bytewise() {
        // Uppercase sorts before lowercase in byte order ("Z" < "a"), and a
        // multi-byte character sorts after every ASCII string.
        let mixed = compute_signature("a", "Z", "é", None);
        let manual = hex::encode(Sha1::digest("Zaé".as_bytes()));

        assert_eq!(mixed, manual);
    }

    #[test]
    fn test_three_and_four_part_variants_differ() {
        let three = compute_signature("token", "1", "2", None);
        let four = compute_signature("token", "1", "2", Some("payload"));

        assert_ne!(three, four);
    }

    #[test]
    fn test_verify_is_deterministic() {
        let credentials = Credentials::new("test", "", "");
        let signature = "69de961a2f8016ab73e3ae075b52c4511a6cc5d4";

        assert!(verify(&credentials, "1234567890", "test", None, signature));
        assert!(verify(&credentials, "1234567890", "test", None, signature));
    }

    #[test]
    fn test_verify_rejects_mismatch() {
        let credentials = Credentials::new("test", "", "");

        assert!(!verify(&credentials, "1234567890", "test", None, "deadbeef"));
        assert!(!verify(
            &credentials,
            "1234567891",
            "test",
            None,
            "69de961a2f8016ab73e3ae075b52c4511a6cc5d4"
        ));
        // Uppercase hex is not accepted
        assert!(!verify(
            &credentials,
            "1234567890",
            "test",
            None,
            "69DE961A2F8016AB73E3AE075B52C4511A6CC5D4"
        ));
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("abc", "abc"));
        assert!(!constant_time_compare("abc", "abd"));
        assert!(!constant_time_compare("abc", "abcd"));
    }
}
