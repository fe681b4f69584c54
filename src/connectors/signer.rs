// src/connectors/signer.rs
use crate::errors::{Result, TraderError};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 request signer. The caller embeds the timestamp in the
/// payload before signing; the signer itself is a pure function of its input.
#[derive(Clone)]
pub struct RequestSigner {
    mac: HmacSha256,
}

impl RequestSigner {
    pub fn new(secret_key: &str) -> Result<Self> {
        if secret_key.is_empty() {
            return Err(TraderError::Validation("secret key is empty".to_string()));
        }
        let mac = HmacSha256::new_from_slice(secret_key.as_bytes())
            .map_err(|e| TraderError::Validation(format!("invalid secret key: {}", e)))?;
        Ok(Self { mac })
    }

    /// Lower-case hex digest of `payload`.
    pub fn sign(&self, payload: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

impl std::fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RequestSigner(..)")
    }
}
