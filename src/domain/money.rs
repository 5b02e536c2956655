use crate::error::PaymentError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::{Add, AddAssign};

/// Represents an accumulated monetary value, such as the amount a project has raised.
///
/// This is a wrapper around `rust_decimal::Decimal` to enforce domain-specific rules
/// and provide type safety for financial calculations.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Balance(pub Decimal);

/// Represents a positive monetary amount for payments.
///
/// Ensures that payment amounts are always positive.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, PaymentError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(PaymentError::ValidationError(
                "Amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = PaymentError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl From<Amount> for Balance {
    fn from(amount: Amount) -> Self {
        Self(amount.0)
    }
}

impl Balance {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl Add for Balance {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Balance {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

/// Fixed conversion rates, expressed as the value of one unit of each
/// currency in the base currency (XOF).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RateTable(BTreeMap<String, Decimal>);

impl Default for RateTable {
    fn default() -> Self {
        let mut rates = BTreeMap::new();
        rates.insert("XOF".to_string(), Decimal::ONE);
        rates.insert("USD".to_string(), Decimal::from(600));
        rates.insert("EUR".to_string(), Decimal::from(656));
        Self(rates)
    }
}

impl RateTable {
    pub fn new(rates: BTreeMap<String, Decimal>) -> Self {
        Self(rates)
    }

    /// Converts `amount` between two currencies, rounded to cents.
    pub fn convert(&self, amount: Decimal, from: &str, to: &str) -> Result<Decimal, PaymentError> {
        if from.eq_ignore_ascii_case(to) {
            return Ok(amount);
        }
        let rate = |code: &str| {
            self.0
                .get(&code.to_ascii_uppercase())
                .copied()
                .filter(|r| *r > Decimal::ZERO)
                .ok_or_else(|| {
                    PaymentError::ValidationError(format!("No exchange rate configured for {code}"))
                })
        };
        let converted = amount * rate(from)? / rate(to)?;
        Ok(converted.round_dp(2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_balance_arithmetic() {
        let mut b1 = Balance::new(dec!(10.0));
        let b2 = Balance::new(dec!(5.0));
        assert_eq!(b1 + b2, Balance::new(dec!(15.0)));
        b1 += Amount::new(dec!(2.5)).unwrap().into();
        assert_eq!(b1, Balance::new(dec!(12.5)));
    }

    #[test]
    fn test_amount_validation() {
        assert!(Amount::new(dec!(1.0)).is_ok());
        assert!(matches!(
            Amount::new(dec!(0.0)),
            Err(PaymentError::ValidationError(_))
        ));
        assert!(matches!(
            Amount::new(dec!(-1.0)),
            Err(PaymentError::ValidationError(_))
        ));
    }

    #[test]
    fn test_rate_conversion_from_xof() {
        let rates = RateTable::default();
        assert_eq!(rates.convert(dec!(6000), "XOF", "USD").unwrap(), dec!(10.00));
        assert_eq!(rates.convert(dec!(5000), "xof", "EUR").unwrap(), dec!(7.62));
        assert_eq!(rates.convert(dec!(12.5), "USD", "usd").unwrap(), dec!(12.5));
    }

    #[test]
    fn test_rate_conversion_unknown_currency() {
        let rates = RateTable::default();
        assert!(matches!(
            rates.convert(dec!(10), "GHS", "USD"),
            Err(PaymentError::ValidationError(_))
        ));
    }
}
