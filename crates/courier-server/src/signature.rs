//! `X-Hub-Signature-256` verification

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the payload signature
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Verify `sha256=<hex>` over the raw request body
pub fn verify_signature(body: &[u8], signature_header: &str, app_secret: &str) -> bool {
    let Some(expected) = signature_header.trim().strip_prefix("sha256=") else {
        debug!("signature header without sha256= prefix");
        return false;
    };
    let Ok(expected) = hex::decode(expected) else {
        debug!("signature is not valid hex");
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(app_secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    // Constant-time comparison
    mac.verify_slice(&expected).is_ok()
}

/// Compute the header value for `body`
pub fn sign(body: &[u8], app_secret: &str) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(app_secret.as_bytes()).ok()?;
    mac.update(body);
    Some(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}
