//! Ledger configuration.

use multibook_fx::FxConfig;
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};

/// Well-known code of the subject absorbing conversion differences.
pub const CONVERSION_DIFFERENCE_SUBJECT: &str = "currency_conversion_difference";

/// Main ledger configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Rate resolution settings.
    pub fx: FxConfig,
    /// Code under which the conversion difference subject is resolved.
    pub conversion_difference_subject: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            fx: FxConfig::default(),
            conversion_difference_subject: CONVERSION_DIFFERENCE_SUBJECT.to_string(),
        }
    }
}

impl LedgerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self {
            fx: FxConfig::from_env(),
            ..Self::default()
        };

        if let Ok(code) = std::env::var("MULTIBOOK_CONVERSION_DIFFERENCE_SUBJECT") {
            config.conversion_difference_subject = code;
        }

        config
    }

    /// Parse from a JSON document; missing fields keep their defaults.
    pub fn from_json(json: &str) -> LedgerResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| LedgerError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> LedgerResult<()> {
        self.fx.validate()?;

        if self.conversion_difference_subject.trim().is_empty() {
            return Err(LedgerError::Configuration(
                "Conversion difference subject cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}
