use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::error::{Result, WebhookError};

type HmacSha256 = Hmac<Sha256>;

/// Verifies a GitHub-style `sha256=<hex>` signature header against `body`
/// under `secret`. Uses `hmac`'s constant-time `verify_slice` so the
/// comparison does not short-circuit on the first mismatched byte.
pub fn verify_signature(secret: &[u8], body: &[u8], signature_header: &str) -> Result<()> {
    let hex_sig = signature_header
        .strip_prefix("sha256=")
        .ok_or(WebhookError::MalformedSignature)?;

    let expected = hex::decode(hex_sig).map_err(|_| WebhookError::MalformedSignature)?;

    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(body);
    mac.verify_slice(&expected).map_err(|_| WebhookError::SignatureInvalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &[u8], body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn valid_signature_passes() {
        let secret = b"topsecret";
        let body = b"{\"ref\":\"refs/heads/main\"}";
        let header = sign(secret, body);
        assert!(verify_signature(secret, body, &header).is_ok());
    }

    #[test]
    fn tampered_body_fails() {
        let secret = b"topsecret";
        let body = b"{\"ref\":\"refs/heads/main\"}";
        let header = sign(secret, body);
        let tampered = b"{\"ref\":\"refs/heads/evil\"}";
        assert!(verify_signature(secret, tampered, &header).is_err());
    }

    #[test]
    fn missing_prefix_is_malformed() {
        let err = verify_signature(b"secret", b"body", "deadbeef").unwrap_err();
        assert!(matches!(err, WebhookError::MalformedSignature));
    }

    #[test]
    fn non_hex_is_malformed() {
        let err = verify_signature(b"secret", b"body", "sha256=not-hex").unwrap_err();
        assert!(matches!(err, WebhookError::MalformedSignature));
    }
}
