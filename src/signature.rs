use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Checks the provider signature: hex encoded HMAC-SHA256 of the raw request
/// body. `payload` must be the bytes as received, never a re-serialization.
pub fn verify(payload: &[u8], supplied_signature: &str, shared_secret: &[u8]) -> bool {
    let supplied_signature = supplied_signature.trim();
    let supplied_signature = supplied_signature
        .strip_prefix("sha256=")
        .unwrap_or(supplied_signature);
    let Ok(signature) = hex::decode(supplied_signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(shared_secret) else {
        return false;
    };
    mac.update(payload);
    // constant time comparison
    mac.verify_slice(&signature).is_ok()
}

#[cfg(test)]
pub fn sign(payload: &[u8], shared_secret: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(shared_secret).unwrap();
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}
