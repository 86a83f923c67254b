//! Payment gateway adapter.
//!
//! The gateway is only asked to open an order for an amount; the shopper pays
//! in the gateway's own client SDK and comes back with a signed payment id.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatewayOrderRequest {
    /// Minor currency units (paise).
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub receipt: Option<String>,
    #[serde(default)]
    pub status: String,
}

/// What the client needs to open the gateway's payment UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatewayHandle {
    pub gateway: String,
    pub key_id: String,
    pub order: GatewayOrder,
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("gateway request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("gateway rejected order ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("gateway unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn name(&self) -> &str;
    /// Publishable key handed to the client SDK.
    fn public_key(&self) -> &str;
    async fn create_order(&self, request: &GatewayOrderRequest) -> Result<GatewayOrder, GatewayError>;
}

pub const DEFAULT_RAZORPAY_URL: &str = "https://api.razorpay.com";

pub struct RazorpayGateway {
    client: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: String,
}

impl RazorpayGateway {
    pub fn new(key_id: impl Into<String>, key_secret: impl Into<String>, base_url: impl Into<String>) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            key_id: key_id.into(),
            key_secret: key_secret.into(),
        })
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    fn name(&self) -> &str { "Razorpay" }
    fn public_key(&self) -> &str { &self.key_id }

    #[instrument(skip(self), fields(receipt = %request.receipt))]
    async fn create_order(&self, request: &GatewayOrderRequest) -> Result<GatewayOrder, GatewayError> {
        let response = self
            .client
            .post(format!("{}/v1/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(request)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected { status: status.as_u16(), body });
        }
        let order: GatewayOrder = response.json().await?;
        debug!(gateway_order = %order.id, "gateway order created");
        Ok(order)
    }
}
