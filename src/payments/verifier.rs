//! Confirmation verifier.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::{EcommerceError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Checks the signature a gateway returns to the client after payment:
/// hex HMAC-SHA256 of `<gateway order id>|<gateway payment id>` keyed with the
/// shared secret.
#[derive(Clone)]
pub struct SignatureVerifier {
    keyed: HmacSha256,
}

impl SignatureVerifier {
    pub fn new(secret: &str) -> Result<Self> {
        let keyed = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| EcommerceError::InvalidInput(format!("gateway secret rejected: {e}")))?;
        Ok(Self { keyed })
    }

    fn mac(&self, gateway_order_id: &str, gateway_payment_id: &str) -> HmacSha256 {
        let mut mac = self.keyed.clone();
        mac.update(gateway_order_id.as_bytes());
        mac.update(b"|");
        mac.update(gateway_payment_id.as_bytes());
        mac
    }

    pub fn expected_signature(&self, gateway_order_id: &str, gateway_payment_id: &str) -> String {
        hex::encode(self.mac(gateway_order_id, gateway_payment_id).finalize().into_bytes())
    }

    /// Constant-time comparison. Malformed hex is a mismatch.
    pub fn verify(&self, gateway_order_id: &str, gateway_payment_id: &str, signature: &str) -> bool {
        match hex::decode(signature.trim()) {
            Ok(bytes) => self.mac(gateway_order_id, gateway_payment_id).verify_slice(&bytes).is_ok(),
            Err(_) => false,
        }
    }
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SignatureVerifier { .. }")
    }
}
