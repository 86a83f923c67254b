//! Payment gateway adapter and confirmation verifier.

mod gateway;
mod verifier;

pub use gateway::{
    GatewayError, GatewayHandle, GatewayOrder, GatewayOrderRequest, PaymentGateway, RazorpayGateway, DEFAULT_RAZORPAY_URL,
};
pub use verifier::SignatureVerifier;

use std::sync::Arc;
use tracing::warn;

use crate::config::AppConfig;
use crate::domain::value_objects::Money;
use crate::{EcommerceError, Result};

/// The configured gateway with its verifier, or neither (demo mode).
#[derive(Clone, Default)]
pub struct Payments {
    gateway: Option<(Arc<dyn PaymentGateway>, SignatureVerifier)>,
}

impl Payments {
    pub fn demo() -> Self { Self::default() }

    pub fn new(gateway: Arc<dyn PaymentGateway>, verifier: SignatureVerifier) -> Self {
        Self { gateway: Some((gateway, verifier)) }
    }

    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        let Some((key_id, secret)) = cfg.gateway_credentials() else {
            warn!("payment gateway not configured, checkouts run in demo mode");
            return Ok(Self::demo());
        };
        let gateway = RazorpayGateway::new(key_id, secret, cfg.razorpay_base_url.clone())
            .map_err(|e| EcommerceError::GatewayUnavailable(e.to_string()))?;
        Ok(Self::new(Arc::new(gateway), SignatureVerifier::new(secret)?))
    }

    pub fn is_configured(&self) -> bool { self.gateway.is_some() }
    pub fn gateway_name(&self) -> Option<&str> { self.gateway.as_ref().map(|(g, _)| g.name()) }
    pub fn verifier(&self) -> Option<&SignatureVerifier> { self.gateway.as_ref().map(|(_, v)| v) }

    /// Opens a gateway order for `amount`. Any failure, including an
    /// unconfigured gateway, is `GatewayUnavailable`.
    pub async fn open_order(&self, receipt: &str, amount: &Money) -> Result<GatewayHandle> {
        let (gateway, _) = self.gateway.as_ref().ok_or_else(|| EcommerceError::GatewayUnavailable("not configured".into()))?;
        let minor = amount
            .to_minor_units()
            .ok_or_else(|| EcommerceError::GatewayUnavailable(format!("amount {amount} out of range")))?;
        let request = GatewayOrderRequest { amount: minor, currency: amount.currency().to_string(), receipt: receipt.to_string() };
        let order = gateway.create_order(&request).await.map_err(|e| EcommerceError::GatewayUnavailable(e.to_string()))?;
        Ok(GatewayHandle { gateway: gateway.name().to_string(), key_id: gateway.public_key().to_string(), order })
    }
}

impl std::fmt::Debug for Payments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Payments").field("gateway", &self.gateway_name()).finish()
    }
}
