use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use std::fmt;

/// Renders a JSON number exactly the way it appears on the wire
///
/// Integers stay integers (`50`) and floats keep their fractional form
/// (`50.0`), which is what external miners and wallets hash and sign.
fn render(number: &Number) -> String {
    Value::Number(number.clone()).to_string()
}

/// A transferred quantity of coins
///
/// Kept as the original JSON number so that re-encoding a received
/// transaction reproduces the bytes its author hashed and signed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(Number);

impl Amount {
    /// Creates an amount from a whole number of coins
    pub fn from_units(units: u64) -> Self {
        Amount(Number::from(units))
    }

    /// Creates an amount from a fractional value, `None` for NaN or infinity
    pub fn from_f64(value: f64) -> Option<Self> {
        Number::from_f64(value).map(Amount)
    }

    /// Numeric value used for balance arithmetic
    pub fn value(&self) -> f64 {
        self.0.as_f64().unwrap_or(f64::NAN)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render(&self.0))
    }
}

/// Wall-clock seconds since the Unix epoch, as a JSON float
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(Number);

impl Timestamp {
    /// The current time with microsecond precision
    pub fn now() -> Self {
        let now = Utc::now();
        let seconds = now.timestamp_micros() as f64 / 1_000_000.0;

        Number::from_f64(seconds)
            .map(Timestamp)
            .unwrap_or_else(|| Timestamp(Number::from(now.timestamp())))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_keeps_wire_form() {
        let whole: Amount = serde_json::from_str("50").unwrap();
        let fractional: Amount = serde_json::from_str("50.0").unwrap();

        assert_eq!(whole.to_string(), "50");
        assert_eq!(fractional.to_string(), "50.0");
        assert_eq!(whole.value(), fractional.value());
        assert_eq!(serde_json::to_string(&fractional).unwrap(), "50.0");
    }

    #[test]
    fn test_amount_constructors() {
        assert_eq!(Amount::from_units(10_000_000).to_string(), "10000000");
        assert_eq!(Amount::from_f64(2.5).unwrap().value(), 2.5);
        assert!(Amount::from_f64(f64::NAN).is_none());
    }

    #[test]
    fn test_timestamp_now_is_fractional_seconds() {
        let ts = Timestamp::now();
        assert!(ts.to_string().parse::<f64>().unwrap() > 1_600_000_000.0);

        let parsed: Timestamp = serde_json::from_str("1718000000.123456").unwrap();
        assert_eq!(parsed.to_string(), "1718000000.123456");
    }
}
