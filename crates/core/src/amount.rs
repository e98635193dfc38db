use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// A number with its commodity, as written on a posting (`-100.00 USD`).
///
/// The decimal keeps the scale it was parsed with so that `100.00` is
/// written back as `100.00`, not `100`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
    pub number: Decimal,
    pub currency: String,
}

impl Amount {
    pub fn new(number: Decimal, currency: &str) -> Self {
        Amount {
            number,
            currency: currency.to_string(),
        }
    }

    /// Rendered number split at the decimal point: (integer part, rest).
    /// The rest keeps its leading `.` when present.
    pub fn split_number(&self) -> (String, String) {
        let text = self.number.to_string();
        match text.find('.') {
            Some(dot) => (text[..dot].to_string(), text[dot..].to_string()),
            None => (text, String::new()),
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.number, self.currency)
    }
}

impl FromStr for Amount {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let (Some(number), Some(currency), None) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(CoreError::InvalidAmount(s.to_string()));
        };
        Ok(Amount::new(parse_decimal(number)?, currency))
    }
}

/// Parses a plain or comma-grouped decimal (`1,234.50`).
pub fn parse_decimal(s: &str) -> Result<Decimal, CoreError> {
    let cleaned = s.trim().replace(',', "");
    Decimal::from_str(&cleaned).map_err(|_| CoreError::InvalidAmount(s.trim().to_string()))
}

/// `|(|a| - |b|)| / avg(|a|, |b|) * 100`, or `None` when both are zero.
pub fn relative_difference_percent(a: Decimal, b: Decimal) -> Option<Decimal> {
    let (a, b) = (a.abs(), b.abs());
    let avg = (a + b) / Decimal::TWO;
    if avg.is_zero() {
        return None;
    }
    Some((a - b).abs() / avg * Decimal::ONE_HUNDRED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parse_amount_with_currency() {
        let amount: Amount = "-100.00 USD".parse().unwrap();
        assert_eq!(amount.number, dec!(-100.00));
        assert_eq!(amount.currency, "USD");
        assert_eq!(amount.to_string(), "-100.00 USD");
    }

    #[test]
    fn parse_amount_rejects_missing_currency() {
        assert!("100.00".parse::<Amount>().is_err());
        assert!("100.00 USD extra".parse::<Amount>().is_err());
        assert!("abc USD".parse::<Amount>().is_err());
    }

    #[test]
    fn parse_decimal_strips_grouping() {
        assert_eq!(parse_decimal("1,234.50").unwrap(), dec!(1234.50));
        assert_eq!(parse_decimal(" 7 ").unwrap(), dec!(7));
        assert!(parse_decimal("").is_err());
    }

    #[test]
    fn split_number_keeps_scale() {
        let amount = Amount::new(dec!(-1234.50), "EUR");
        assert_eq!(amount.split_number(), ("-1234".to_string(), ".50".to_string()));
        let whole = Amount::new(dec!(15), "EUR");
        assert_eq!(whole.split_number(), ("15".to_string(), String::new()));
    }

    #[test]
    fn relative_difference_uses_average() {
        let pct = relative_difference_percent(dec!(100.00), dec!(-102.00)).unwrap();
        assert!(pct > dec!(1.98) && pct < dec!(1.99), "pct was {pct}");
        assert_eq!(relative_difference_percent(dec!(50), dec!(50)), Some(Decimal::ZERO));
        assert_eq!(relative_difference_percent(Decimal::ZERO, Decimal::ZERO), None);
    }
}
