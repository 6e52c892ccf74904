use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;

/// Money is an exact decimal. Balances and operation amounts never go through floats.
pub type Amount = Decimal;

/// Currency stamped on new wallets unless the service is configured otherwise.
pub const DEFAULT_CURRENCY: &str = "USD";

/// Parse a user-supplied decimal string into an amount.
/// Example: "50.00" -> 50.00, "12.5" -> 12.5, "-5" -> -5
///
/// The sign is kept: rejecting non-positive amounts is the ledger's job,
/// so it can report which operation refused them.
pub fn parse_amount(input: &str) -> Result<Amount, ParseAmountError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ParseAmountError::Empty);
    }
    Decimal::from_str(input).map_err(|_| ParseAmountError::InvalidFormat(input.to_string()))
}

/// Render an amount the way it is persisted: plain decimal, no exponent, no trailing zeros.
pub fn format_amount(amount: Amount) -> String {
    amount.normalize().to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseAmountError {
    Empty,
    InvalidFormat(String),
}

impl fmt::Display for ParseAmountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseAmountError::Empty => write!(f, "amount is empty"),
            ParseAmountError::InvalidFormat(s) => write!(f, "invalid money format: {}", s),
        }
    }
}

impl std::error::Error for ParseAmountError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Amount {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("50.00"), Ok(dec("50.00")));
        assert_eq!(parse_amount("50"), Ok(dec("50")));
        assert_eq!(parse_amount(" 12.5 "), Ok(dec("12.5")));
        assert_eq!(parse_amount("0.01"), Ok(dec("0.01")));
        assert_eq!(parse_amount("-5"), Ok(dec("-5")));
    }

    #[test]
    fn test_parse_amount_invalid() {
        assert_eq!(parse_amount(""), Err(ParseAmountError::Empty));
        assert!(parse_amount("abc").is_err());
        assert!(parse_amount("12.34.56").is_err());
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(dec("100.00")), "100");
        assert_eq!(format_amount(dec("12.50")), "12.5");
        assert_eq!(format_amount(dec("0")), "0");
        assert_eq!(format_amount(dec("-0.01")), "-0.01");
    }
}
