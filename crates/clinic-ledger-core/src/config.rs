//! Ledger configuration.
//!
//! Every field has a default, so a config file only needs the values it
//! overrides:
//!
//! ```json
//! { "clinic_name": "Riverside Clinic", "currency": "KES", "mrn_prefix": "RC" }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// How a payment without explicit targets is spread over open charges.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStrategy {
    /// Oldest charge first
    #[default]
    OldestFirst,
    /// Charge posted closest to the payment date first
    NearestDate,
}

/// Clinic-wide ledger settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerConfig {
    #[serde(default = "default_clinic_name")]
    pub clinic_name: String,

    /// ISO 4217 code. A ledger holds one currency.
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Prefix of generated medical record numbers
    #[serde(default = "default_mrn_prefix")]
    pub mrn_prefix: String,

    /// Absolute variance still reported as balanced
    #[serde(default)]
    pub variance_tolerance_cents: i64,

    /// Absolute variance above which closing requires a note
    #[serde(default = "default_variance_note_threshold")]
    pub variance_note_threshold_cents: i64,

    #[serde(default)]
    pub allocation_strategy: AllocationStrategy,

    /// Refunds above this need a manager or admin
    #[serde(default = "default_manager_refund_threshold")]
    pub manager_refund_threshold_cents: i64,

    /// Jaro-Winkler similarity at which two patient names are flagged
    #[serde(default = "default_duplicate_name_threshold")]
    pub duplicate_name_threshold: f64,

    /// Identifier stamped on exports
    #[serde(default = "default_system_id")]
    pub system_id: String,
}

fn default_clinic_name() -> String {
    "Clinic".to_string()
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_mrn_prefix() -> String {
    "MRN".to_string()
}

fn default_variance_note_threshold() -> i64 {
    500
}

fn default_manager_refund_threshold() -> i64 {
    10_000
}

fn default_duplicate_name_threshold() -> f64 {
    0.92
}

fn default_system_id() -> String {
    "clinic-ledger".to_string()
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            clinic_name: default_clinic_name(),
            currency: default_currency(),
            mrn_prefix: default_mrn_prefix(),
            variance_tolerance_cents: 0,
            variance_note_threshold_cents: default_variance_note_threshold(),
            allocation_strategy: AllocationStrategy::default(),
            manager_refund_threshold_cents: default_manager_refund_threshold(),
            duplicate_name_threshold: default_duplicate_name_threshold(),
            system_id: default_system_id(),
        }
    }
}

impl LedgerConfig {
    /// Parse and validate a JSON config.
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json_str(&contents)?;
        tracing::debug!(path = %path.as_ref().display(), clinic = %config.clinic_name, "Loaded ledger config");
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.currency.trim().is_empty() {
            return Err(ConfigError::Invalid("currency must not be empty".into()));
        }
        if self.mrn_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid("mrn_prefix must not be empty".into()));
        }
        if self.variance_tolerance_cents < 0 {
            return Err(ConfigError::Invalid(
                "variance_tolerance_cents must not be negative".into(),
            ));
        }
        if self.variance_note_threshold_cents < self.variance_tolerance_cents {
            return Err(ConfigError::Invalid(
                "variance_note_threshold_cents must be at least the tolerance".into(),
            ));
        }
        if self.manager_refund_threshold_cents < 0 {
            return Err(ConfigError::Invalid(
                "manager_refund_threshold_cents must not be negative".into(),
            ));
        }
        if !(self.duplicate_name_threshold > 0.0 && self.duplicate_name_threshold <= 1.0) {
            return Err(ConfigError::Invalid(
                "duplicate_name_threshold must be in (0, 1]".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_is_valid() {
        let config = LedgerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.allocation_strategy, AllocationStrategy::OldestFirst);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = LedgerConfig::from_json_str(
            r#"{"clinic_name": "Riverside", "allocation_strategy": "nearest_date"}"#,
        )
        .unwrap();
        assert_eq!(config.clinic_name, "Riverside");
        assert_eq!(config.allocation_strategy, AllocationStrategy::NearestDate);
        assert_eq!(config.currency, "USD");
        assert_eq!(config.mrn_prefix, "MRN");
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(matches!(
            LedgerConfig::from_json_str(r#"{"variance_tolerance_cents": -1}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            LedgerConfig::from_json_str(
                r#"{"variance_tolerance_cents": 1000, "variance_note_threshold_cents": 10}"#
            ),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            LedgerConfig::from_json_str(r#"{"duplicate_name_threshold": 1.5}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            LedgerConfig::from_json_str(r#"{"currency": " "}"#),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_rejects_unknown_strategy() {
        assert!(matches!(
            LedgerConfig::from_json_str(r#"{"allocation_strategy": "random"}"#),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"currency": "KES", "mrn_prefix": "RC"}}"#).unwrap();

        let config = LedgerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.currency, "KES");
        assert_eq!(config.mrn_prefix, "RC");
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            LedgerConfig::from_file("/nonexistent/ledger.json"),
            Err(ConfigError::Io(_))
        ));
    }
}
