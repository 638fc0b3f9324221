//! HMAC request signing for the VerifyMyAge API.
//!
//! Every vendor request carries an `Authorization: hmac <key>:<signature>`
//! header, where the signature is the HMAC-SHA256 hex digest of the exact
//! request body, keyed with the API secret. Signing anything other than the
//! bytes that go on the wire produces a signature the vendor rejects, so
//! callers sign the serialized body and then send that same string.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute the HMAC-SHA256 hex digest of `payload`, keyed with `secret`.
pub fn sign_payload(secret: &str, payload: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Build the vendor `Authorization` header value from a key and signature.
pub fn auth_header(api_key: &str, signature: &str) -> String {
    format!("hmac {}:{}", api_key, signature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        // RFC-style test vector for HMAC-SHA256
        let signature = sign_payload("key", "The quick brown fox jumps over the lazy dog");
        assert_eq!(
            signature,
            "f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
        );
    }

    #[test]
    fn signature_is_lowercase_hex() {
        let signature = sign_payload("secret", r#"{"file_url":"https://example.com/a.csv"}"#);
        assert_eq!(signature.len(), 64);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(signature, signature.to_lowercase());
    }

    #[test]
    fn signature_depends_on_secret_and_payload() {
        let base = sign_payload("secret-a", "payload");
        assert_eq!(base, sign_payload("secret-a", "payload"));
        assert_ne!(base, sign_payload("secret-b", "payload"));
        assert_ne!(base, sign_payload("secret-a", "payload2"));
    }

    #[test]
    fn header_format() {
        assert_eq!(auth_header("my-key", "abc123"), "hmac my-key:abc123");
    }
}
