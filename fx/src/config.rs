//! FX configuration.

use multibook_common::Currency;
use serde::{Deserialize, Serialize};

use crate::error::{FxError, FxResult};

/// Configuration for rate resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FxConfig {
    /// Hub currency for two-hop chaining and staleness checks.
    pub reference_currency: Currency,
    /// How many days back a rate still counts as fresh. Zero means only a
    /// rate recorded today does.
    pub max_rate_age_days: u32,
}

impl Default for FxConfig {
    fn default() -> Self {
        Self {
            reference_currency: Currency::rub(),
            max_rate_age_days: 0,
        }
    }
}

impl FxConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(code) = std::env::var("MULTIBOOK_REFERENCE_CURRENCY") {
            config.reference_currency = Currency::new(code);
        }

        if let Ok(days) = std::env::var("MULTIBOOK_MAX_RATE_AGE_DAYS") {
            if let Ok(days) = days.parse() {
                config.max_rate_age_days = days;
            }
        }

        config
    }

    /// Parse from a JSON document; missing fields keep their defaults.
    pub fn from_json(json: &str) -> FxResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| FxError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> FxResult<()> {
        if self.reference_currency.code().is_empty() {
            return Err(FxError::Configuration(
                "Reference currency cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FxConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.reference_currency, Currency::rub());
    }

    #[test]
    fn test_from_json() {
        let config = FxConfig::from_json(r#"{"reference_currency": "usd"}"#).unwrap();
        assert_eq!(config.reference_currency, Currency::usd());
        assert_eq!(config.max_rate_age_days, 0);

        assert!(FxConfig::from_json(r#"{"reference_currency": ""}"#).is_err());
        assert!(FxConfig::from_json("not json").is_err());
    }
}
