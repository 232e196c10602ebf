//! Runtime configuration.
//!
//! A single [`Config`] value is built at startup (defaults, or a JSON file)
//! and handed to the service, which passes the relevant sections to the
//! resolver and calculator it constructs.
use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub validation: ValidationLimits,
    pub rates: RateRules,
    pub pay: PayRules,
    pub events: EventSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationLimits {
    pub max_delivery_hours: Decimal,
    pub max_associated_hours: Decimal,
    pub max_description_length: usize,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_delivery_hours: Decimal::new(380, 1),
            max_associated_hours: Decimal::new(380, 1),
            max_description_length: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateRules {
    /// Use rows with no tier when nothing matches the requested tier.
    pub tier_agnostic_fallback: bool,
    /// Use non-repeatable codes for a repeat session when no repeatable code exists.
    pub repeat_fallback: bool,
}

impl Default for RateRules {
    fn default() -> Self {
        Self {
            tier_agnostic_fallback: true,
            repeat_fallback: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PayRules {
    pub default_clause_reference: String,
    pub currency: String,
}

impl Default for PayRules {
    fn default() -> Self {
        Self {
            default_clause_reference: "Schedule 1".to_owned(),
            currency: "AUD".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventSettings {
    pub capacity: usize,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self { capacity: 1024 }
    }
}

impl Config {
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let limits = &self.validation;
        if limits.max_delivery_hours <= Decimal::ZERO || limits.max_associated_hours < Decimal::ZERO
        {
            return Err(ConfigError::Invalid(
                "hour limits must be positive".to_owned(),
            ));
        }
        if limits.max_description_length == 0 {
            return Err(ConfigError::Invalid(
                "max_description_length must be positive".to_owned(),
            ));
        }
        if self.events.capacity == 0 {
            return Err(ConfigError::Invalid(
                "event capacity must be positive".to_owned(),
            ));
        }
        Ok(())
    }
}
