//! Matching parameters and the override merge applied before each run

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::{ReconcileError, ReconcileResult};
use crate::utils::decimal;

/// Source currency -> target currency -> multiplicative rate
pub type FxRateTable = HashMap<String, HashMap<String, BigDecimal>>;

/// Currency every bridged conversion passes through
pub const REFERENCE_CURRENCY: &str = "USD";

/// Configurable matching parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationConfig {
    /// Fraction (not percent) of the expected amount a variance may reach and still
    /// count as matched. `0.02` accepts settlements within 2%.
    #[serde(default, deserialize_with = "decimal::deserialize")]
    pub variance_tolerance_pct: BigDecimal,
    /// Settlements taking more than this many whole days are flagged late
    #[serde(default = "default_late_settlement_days")]
    pub late_settlement_days: i64,
    /// Minimum absolute variance that makes a discrepancy high priority
    #[serde(
        default = "default_high_priority_threshold",
        deserialize_with = "decimal::deserialize"
    )]
    pub high_priority_threshold: BigDecimal,
    #[serde(
        default = "default_fx_rates",
        deserialize_with = "decimal::deserialize_rate_table"
    )]
    pub fx_rates: FxRateTable,
}

fn default_late_settlement_days() -> i64 {
    7
}

fn default_high_priority_threshold() -> BigDecimal {
    BigDecimal::from(1000)
}

/// Built-in rates for the currencies the processors settle in
pub fn default_fx_rates() -> FxRateTable {
    let to_usd = |digits: i64, scale: i64| {
        let mut rates = HashMap::new();
        rates.insert(
            REFERENCE_CURRENCY.to_string(),
            BigDecimal::new(digits.into(), scale),
        );
        rates
    };

    let mut table = HashMap::new();
    table.insert("MXN".to_string(), to_usd(58, 3));
    table.insert("COP".to_string(), to_usd(24, 5));
    table.insert("BRL".to_string(), to_usd(20, 2));
    table.insert("USD".to_string(), to_usd(1, 0));
    table
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            variance_tolerance_pct: BigDecimal::from(0),
            late_settlement_days: default_late_settlement_days(),
            high_priority_threshold: default_high_priority_threshold(),
            fx_rates: default_fx_rates(),
        }
    }
}

impl ReconciliationConfig {
    /// Set the variance tolerance fraction
    pub fn with_tolerance(mut self, tolerance: BigDecimal) -> Self {
        self.variance_tolerance_pct = tolerance;
        self
    }

    /// Set the late-settlement threshold in days
    pub fn with_late_settlement_days(mut self, days: i64) -> Self {
        self.late_settlement_days = days;
        self
    }

    /// Set the high-priority variance threshold
    pub fn with_high_priority_threshold(mut self, threshold: BigDecimal) -> Self {
        self.high_priority_threshold = threshold;
        self
    }

    /// Reject negative thresholds and non-positive FX rates
    pub fn validate(&self) -> ReconcileResult<()> {
        let zero = BigDecimal::from(0);

        if self.variance_tolerance_pct < zero {
            return Err(ReconcileError::InvalidConfig(format!(
                "variance_tolerance_pct must not be negative, got {}",
                self.variance_tolerance_pct
            )));
        }

        if self.late_settlement_days < 0 {
            return Err(ReconcileError::InvalidConfig(format!(
                "late_settlement_days must not be negative, got {}",
                self.late_settlement_days
            )));
        }

        if self.high_priority_threshold < zero {
            return Err(ReconcileError::InvalidConfig(format!(
                "high_priority_threshold must not be negative, got {}",
                self.high_priority_threshold
            )));
        }

        for (from, targets) in &self.fx_rates {
            for (to, rate) in targets {
                if *rate <= zero {
                    return Err(ReconcileError::InvalidConfig(format!(
                        "FX rate {} -> {} must be positive, got {}",
                        from, to, rate
                    )));
                }
            }
        }

        Ok(())
    }

    /// Apply per-run overrides. A field replaces the base value only when it is
    /// present and positive (non-empty for the rate table); absent or zero values
    /// keep the base.
    pub fn merged_with(&self, overrides: &ConfigOverrides) -> Self {
        let zero = BigDecimal::from(0);
        let mut merged = self.clone();

        if let Some(tolerance) = overrides.variance_tolerance_pct.as_ref() {
            if *tolerance > zero {
                merged.variance_tolerance_pct = tolerance.clone();
            }
        }
        if let Some(days) = overrides.late_settlement_days {
            if days > 0 {
                merged.late_settlement_days = days;
            }
        }
        if let Some(threshold) = overrides.high_priority_threshold.as_ref() {
            if *threshold > zero {
                merged.high_priority_threshold = threshold.clone();
            }
        }
        if let Some(rates) = overrides.fx_rates.as_ref() {
            if !rates.is_empty() {
                merged.fx_rates = rates.clone();
            }
        }

        merged
    }
}

/// Optional per-run replacements for [`ReconciliationConfig`] fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigOverrides {
    #[serde(default, deserialize_with = "decimal::deserialize_option")]
    pub variance_tolerance_pct: Option<BigDecimal>,
    #[serde(default)]
    pub late_settlement_days: Option<i64>,
    #[serde(default, deserialize_with = "decimal::deserialize_option")]
    pub high_priority_threshold: Option<BigDecimal>,
    #[serde(default, deserialize_with = "decimal::deserialize_rate_table_option")]
    pub fx_rates: Option<FxRateTable>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_default_config() {
        let config = ReconciliationConfig::default();
        assert_eq!(config.variance_tolerance_pct, BigDecimal::from(0));
        assert_eq!(config.late_settlement_days, 7);
        assert_eq!(config.high_priority_threshold, BigDecimal::from(1000));
        assert_eq!(
            config.fx_rates["MXN"]["USD"],
            BigDecimal::from_str("0.058").unwrap()
        );
        assert_eq!(
            config.fx_rates["COP"]["USD"],
            BigDecimal::from_str("0.00024").unwrap()
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_merge_ignores_zero_and_absent_overrides() {
        let base = ReconciliationConfig::default();
        let overrides = ConfigOverrides {
            variance_tolerance_pct: Some(BigDecimal::from(0)),
            late_settlement_days: Some(0),
            high_priority_threshold: None,
            fx_rates: Some(HashMap::new()),
        };

        assert_eq!(base.merged_with(&overrides), base);
    }

    #[test]
    fn test_merge_applies_positive_overrides() {
        let base = ReconciliationConfig::default();
        let overrides = ConfigOverrides {
            variance_tolerance_pct: Some(BigDecimal::from_str("0.02").unwrap()),
            late_settlement_days: Some(3),
            high_priority_threshold: Some(BigDecimal::from(250)),
            fx_rates: None,
        };

        let merged = base.merged_with(&overrides);
        assert_eq!(
            merged.variance_tolerance_pct,
            BigDecimal::from_str("0.02").unwrap()
        );
        assert_eq!(merged.late_settlement_days, 3);
        assert_eq!(merged.high_priority_threshold, BigDecimal::from(250));
        assert_eq!(merged.fx_rates, base.fx_rates);
    }

    #[test]
    fn test_validate_rejects_non_positive_rate() {
        let mut config = ReconciliationConfig::default();
        config
            .fx_rates
            .entry("EUR".to_string())
            .or_default()
            .insert("USD".to_string(), BigDecimal::from(0));

        assert!(matches!(
            config.validate(),
            Err(ReconcileError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_missing_json_fields_take_defaults() {
        let config: ReconciliationConfig =
            serde_json::from_str(r#"{"variance_tolerance_pct": "0.05"}"#).unwrap();
        assert_eq!(
            config.variance_tolerance_pct,
            BigDecimal::from_str("0.05").unwrap()
        );
        assert_eq!(config.late_settlement_days, 7);
        assert_eq!(config.fx_rates, default_fx_rates());
    }
}
