//! Payment gateway signature verification.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Verifies that a payment callback really came from the gateway.
///
/// Implementations are pure: no I/O, no state.
pub trait PaymentVerifier: Send + Sync + std::fmt::Debug {
    /// Returns `true` if `signature` authenticates `(order_ref, payment_ref)`.
    fn verify_signature(&self, order_ref: &str, payment_ref: &str, signature: &str) -> bool;
}

/// HMAC-SHA256 over `"{order_ref}|{payment_ref}"`, hex encoded.
pub struct HmacPaymentVerifier {
    key: Vec<u8>,
}

impl std::fmt::Debug for HmacPaymentVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacPaymentVerifier").finish_non_exhaustive()
    }
}

impl HmacPaymentVerifier {
    /// Creates a verifier for the gateway's shared key.
    #[must_use]
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into() }
    }

    fn mac(&self, order_ref: &str, payment_ref: &str) -> Option<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.key).ok()?;
        mac.update(order_ref.as_bytes());
        mac.update(b"|");
        mac.update(payment_ref.as_bytes());
        Some(mac)
    }

    /// Produces the signature the gateway would send. Used by tests and
    /// local tooling that stands in for the gateway.
    #[must_use]
    pub fn sign(&self, order_ref: &str, payment_ref: &str) -> String {
        self.mac(order_ref, payment_ref)
            .map(|mac| hex::encode(mac.finalize().into_bytes()))
            .unwrap_or_default()
    }
}

impl PaymentVerifier for HmacPaymentVerifier {
    fn verify_signature(&self, order_ref: &str, payment_ref: &str, signature: &str) -> bool {
        let Ok(expected) = hex::decode(signature) else {
            return false;
        };
        self.mac(order_ref, payment_ref)
            .is_some_and(|mac| mac.verify_slice(&expected).is_ok())
    }
}
