//! X-Line-Signature: base64 HMAC-SHA256 of the raw request body keyed by the channel secret.

use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the request signature.
pub const SIGNATURE_HEADER: &str = "X-Line-Signature";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature header missing")]
    Missing,
    #[error("signature header is not valid base64")]
    Encoding,
    #[error("signature mismatch")]
    Mismatch,
    #[error("channel secret rejected as hmac key")]
    Key,
}

fn mac_for(secret: &[u8], body: &[u8]) -> Result<HmacSha256, SignatureError> {
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(m) => m,
        Err(_) => return Err(SignatureError::Key),
    };
    mac.update(body);
    Ok(mac)
}

/// Compute the signature header value for `body`.
pub fn sign(secret: &[u8], body: &[u8]) -> Result<String, SignatureError> {
    let tag = mac_for(secret, body)?.finalize().into_bytes();
    Ok(base64::engine::general_purpose::STANDARD.encode(tag))
}

/// Check `header` against the body. The tag comparison is constant time.
pub fn verify(secret: &[u8], body: &[u8], header: Option<&str>) -> Result<(), SignatureError> {
    let header = header
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .ok_or(SignatureError::Missing)?;
    let expected = base64::engine::general_purpose::STANDARD
        .decode(header)
        .map_err(|_| SignatureError::Encoding)?;
    mac_for(secret, body)?
        .verify_slice(&expected)
        .map_err(|_| SignatureError::Mismatch)
}
