//! Serde readers for decimal fields
//!
//! Uploads and configuration send amounts either as JSON strings or as JSON
//! numbers. Numbers reach the deserializer as `f64`, so they are parsed from
//! their shortest round-trip text (`100.3`) instead of the binary expansion of
//! the float (`100.2999999999999971578...`). Strings are parsed as written.

use bigdecimal::BigDecimal;
use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::config::FxRateTable;

struct DecimalVisitor;

impl<'de> Visitor<'de> for DecimalVisitor {
    type Value = BigDecimal;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a decimal number or a numeric string")
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<BigDecimal, E> {
        Ok(BigDecimal::from(value))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<BigDecimal, E> {
        Ok(BigDecimal::from(value))
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<BigDecimal, E> {
        if !value.is_finite() {
            return Err(E::custom(format!("non-finite decimal {}", value)));
        }
        BigDecimal::from_str(&value.to_string()).map_err(E::custom)
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<BigDecimal, E> {
        BigDecimal::from_str(value.trim()).map_err(E::custom)
    }
}

/// Wrapper used to read decimals nested inside options and maps
#[derive(Deserialize)]
struct Decimal(#[serde(deserialize_with = "deserialize")] BigDecimal);

pub fn deserialize<'de, D>(deserializer: D) -> Result<BigDecimal, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(DecimalVisitor)
}

pub fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<BigDecimal>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Decimal>::deserialize(deserializer)?.map(|d| d.0))
}

pub fn deserialize_rate_table<'de, D>(deserializer: D) -> Result<FxRateTable, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = HashMap::<String, HashMap<String, Decimal>>::deserialize(deserializer)?;
    Ok(into_rate_table(raw))
}

pub fn deserialize_rate_table_option<'de, D>(
    deserializer: D,
) -> Result<Option<FxRateTable>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<HashMap<String, HashMap<String, Decimal>>>::deserialize(deserializer)?;
    Ok(raw.map(into_rate_table))
}

fn into_rate_table(raw: HashMap<String, HashMap<String, Decimal>>) -> FxRateTable {
    raw.into_iter()
        .map(|(from, targets)| {
            let targets = targets.into_iter().map(|(to, rate)| (to, rate.0)).collect();
            (from, targets)
        })
        .collect()
}
