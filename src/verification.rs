use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the delivery signature when a webhook secret is set.
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

/// Sign an outbound webhook body. Produces "sha256=<hex>".
pub fn sign_payload(secret: &str, body: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    Some(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// Check a "sha256=<hex>" signature against the body, in constant time.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Some(claimed) = signature
        .strip_prefix("sha256=")
        .and_then(|h| hex::decode(h).ok())
    else {
        return false;
    };
    HmacSha256::new_from_slice(secret.as_bytes())
        .map(|mut mac| {
            mac.update(body);
            mac.verify_slice(&claimed).is_ok()
        })
        .unwrap_or(false)
}

/// Validate an `Authorization: Bearer <token>` header against the configured
/// token. With no token configured every request is rejected.
pub fn verify_bearer(expected: Option<&str>, header_value: Option<&str>) -> Result<(), &'static str> {
    let token = header_value
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or("No token provided or invalid format")?;
    match expected {
        Some(expected) if !expected.is_empty() && token == expected => Ok(()),
        _ => Err("Invalid token"),
    }
}

/// Exact match of a presented shared secret, used for gateway callbacks.
pub fn verify_shared_secret(expected: &str, presented: &str) -> bool {
    presented == expected
}
