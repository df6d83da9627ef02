//! HMAC-SHA256 integrity hash over a metric's canonical form.

use std::fmt;

use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::Metric;

type HmacSha256 = Hmac<Sha256>;

/// Shared secret used to sign and verify metrics.
///
/// An empty secret switches hashing off: nothing is signed and every
/// metric verifies.
#[derive(Clone, Default)]
pub struct HashKey {
    secret: Option<Vec<u8>>,
}

impl HashKey {
    pub fn new(secret: &str) -> Self {
        if secret.is_empty() {
            Self::disabled()
        } else {
            Self {
                secret: Some(secret.as_bytes().to_vec()),
            }
        }
    }

    pub fn disabled() -> Self {
        Self { secret: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.secret.is_some()
    }

    /// Lowercase hex digest of `metric`'s canonical form, or `None` when
    /// hashing is disabled.
    pub fn sign(&self, metric: &Metric) -> Option<String> {
        let mac = self.mac(metric)?;
        Some(hex::encode(mac.finalize().into_bytes()))
    }

    /// True if the metric carries no hash, hashing is disabled, or the hash
    /// matches the digest recomputed from the metric's current value.
    pub fn verify(&self, metric: &Metric) -> bool {
        let Some(claimed) = metric.hash.as_deref() else {
            return true;
        };
        let Some(mac) = self.mac(metric) else {
            return true;
        };
        match hex::decode(claimed) {
            Ok(bytes) => mac.verify_slice(&bytes).is_ok(),
            Err(_) => false,
        }
    }

    fn mac(&self, metric: &Metric) -> Option<HmacSha256> {
        let secret = self.secret.as_deref()?;
        // HMAC accepts keys of any length
        let mut mac = HmacSha256::new_from_slice(secret).ok()?;
        mac.update(metric.to_string().as_bytes());
        Some(mac)
    }
}

impl fmt::Debug for HashKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashKey")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
