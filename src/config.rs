//! Service configuration, read from the process environment (and `.env`).

use config::{Config, ConfigError, Environment};
use serde::Deserialize;
use thiserror::Error;
use validator::Validate;

use crate::payments::DEFAULT_RAZORPAY_URL;

#[derive(Error, Debug)]
pub enum AppConfigError {
    #[error("configuration load error: {0}")]
    Load(#[from] ConfigError),
    #[error("configuration validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AppConfig {
    #[validate(range(min = 1))]
    pub port: u16,
    /// Absent means the in-memory store.
    pub database_url: Option<String>,
    #[validate(range(min = 1, max = 100))]
    pub database_max_connections: u32,
    pub nats_url: Option<String>,
    pub razorpay_key_id: Option<String>,
    pub razorpay_key_secret: Option<String>,
    pub razorpay_base_url: String,
    #[validate(length(equal = 3))]
    pub currency: String,
    /// Zero disables reservation expiry.
    pub reservation_ttl_minutes: u64,
    #[validate(range(min = 1))]
    pub expiry_sweep_seconds: u64,
    pub allow_demo_override: bool,
    pub admin_token: Option<String>,
    pub log_json: bool,
}

impl AppConfig {
    pub fn load() -> Result<Self, AppConfigError> {
        Self::from_environment(Environment::default())
    }

    /// Builds from an explicit environment source; tests pass a fixed map.
    pub fn from_environment(env: Environment) -> Result<Self, AppConfigError> {
        let config = Config::builder()
            .set_default("port", 8083)?
            .set_default("database_max_connections", 10)?
            .set_default("razorpay_base_url", DEFAULT_RAZORPAY_URL)?
            .set_default("currency", "INR")?
            .set_default("reservation_ttl_minutes", 30)?
            .set_default("expiry_sweep_seconds", 60)?
            .set_default("allow_demo_override", true)?
            .set_default("log_json", false)?
            .add_source(env.try_parsing(true))
            .build()?;
        let cfg: AppConfig = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn reservation_ttl(&self) -> Option<chrono::Duration> {
        let minutes = i64::try_from(self.reservation_ttl_minutes).ok()?;
        (minutes > 0).then(|| chrono::Duration::minutes(minutes))
    }

    /// Key id and secret, or `None` when the gateway is unconfigured. Placeholder
    /// keys (`YOUR_...`) count as unconfigured.
    pub fn gateway_credentials(&self) -> Option<(&str, &str)> {
        let key_id = self.razorpay_key_id.as_deref().map(str::trim).filter(|k| !k.is_empty())?;
        let secret = self.razorpay_key_secret.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        if key_id.starts_with("YOUR_") {
            return None;
        }
        Some((key_id, secret))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig, AppConfigError> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_environment(Environment::default().source(Some(map)))
    }

    #[test]
    fn test_defaults() {
        let cfg = load(&[]).unwrap();
        assert_eq!(cfg.port, 8083);
        assert_eq!(cfg.currency, "INR");
        assert_eq!(cfg.reservation_ttl(), Some(chrono::Duration::minutes(30)));
        assert!(cfg.allow_demo_override);
        assert!(cfg.database_url.is_none());
        assert!(cfg.gateway_credentials().is_none());
    }

    #[test]
    fn test_overrides_and_placeholder_keys() {
        let cfg = load(&[("PORT", "9000"), ("RESERVATION_TTL_MINUTES", "0"), ("RAZORPAY_KEY_ID", "YOUR_KEY"), ("RAZORPAY_KEY_SECRET", "x")])
            .unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.reservation_ttl(), None);
        assert!(cfg.gateway_credentials().is_none());

        let cfg = load(&[("RAZORPAY_KEY_ID", "rzp_test_1"), ("RAZORPAY_KEY_SECRET", "s3cret")]).unwrap();
        assert_eq!(cfg.gateway_credentials(), Some(("rzp_test_1", "s3cret")));
    }

    #[test]
    fn test_rejects_bad_currency() {
        assert!(matches!(load(&[("CURRENCY", "RUPEES")]), Err(AppConfigError::Validation(_))));
    }
}
