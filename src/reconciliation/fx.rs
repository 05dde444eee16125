//! Static-table currency conversion
//!
//! Conversion fails open: when neither a direct rate nor a bridge through
//! [`REFERENCE_CURRENCY`] exists, [`FxConverter::convert`] returns the amount
//! unchanged. Callers that need FX-adjusted variances must supply a complete
//! table; [`FxConverter::try_convert`] exposes whether a rate was found.

use bigdecimal::BigDecimal;
use log::warn;

use crate::config::{FxRateTable, REFERENCE_CURRENCY};

/// Converts amounts using a borrowed rate table
#[derive(Debug, Clone, Copy)]
pub struct FxConverter<'a> {
    rates: &'a FxRateTable,
}

impl<'a> FxConverter<'a> {
    pub fn new(rates: &'a FxRateTable) -> Self {
        Self { rates }
    }

    fn rate(&self, from: &str, to: &str) -> Option<&'a BigDecimal> {
        self.rates.get(from).and_then(|targets| targets.get(to))
    }

    /// Convert `amount` from one currency to another, or `None` when the table
    /// has no path between them
    pub fn try_convert(&self, amount: &BigDecimal, from: &str, to: &str) -> Option<BigDecimal> {
        if from == to {
            return Some(amount.clone());
        }

        if let Some(rate) = self.rate(from, to) {
            return Some(amount * rate);
        }

        let from_usd = self.rate(from, REFERENCE_CURRENCY)?;
        let to_usd = self.rate(to, REFERENCE_CURRENCY)?;
        if *to_usd == BigDecimal::from(0) {
            return None;
        }

        Some(amount * from_usd / to_usd.clone())
    }

    /// Convert `amount`, returning it unconverted when no rate resolves
    pub fn convert(&self, amount: &BigDecimal, from: &str, to: &str) -> BigDecimal {
        match self.try_convert(amount, from, to) {
            Some(converted) => converted,
            None => {
                warn!(
                    "No FX rate from {} to {}, comparing amounts unconverted",
                    from, to
                );
                amount.clone()
            }
        }
    }
}
