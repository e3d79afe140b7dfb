use bigdecimal::BigDecimal;
use std::fmt;

pub const CURRENCY_CODE_LEN: usize = 3;
pub const GATEWAY_NAME_MAX_LEN: usize = 32;
pub const RECEIVING_ACCOUNT_MAX_LEN: usize = 255;
pub const AUTH_CODE_MAX_LEN: usize = 16;
pub const AMOUNT_MAX_SCALE: i64 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

pub fn sanitize_string(value: &str) -> String {
    value
        .chars()
        .filter(|ch| !ch.is_control())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }

    Ok(())
}

pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.len() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}

pub fn validate_currency(currency: &str) -> ValidationResult {
    let currency = sanitize_string(currency);
    validate_required("currency", &currency)?;

    if currency.len() != CURRENCY_CODE_LEN || !currency.chars().all(|ch| ch.is_ascii_uppercase())
    {
        return Err(ValidationError::new(
            "currency",
            "must be a three-letter uppercase ISO code",
        ));
    }

    Ok(())
}

pub fn validate_user_id(user_id: i64) -> ValidationResult {
    if user_id <= 0 {
        return Err(ValidationError::new("user_id", "must be a positive id"));
    }

    Ok(())
}

/// Amounts must be positive with at most two decimal places.
pub fn validate_amount(amount: &BigDecimal) -> ValidationResult {
    if amount <= &BigDecimal::from(0) {
        return Err(ValidationError::new("amount", "must be greater than zero"));
    }

    let (_, scale) = amount.normalized().as_bigint_and_exponent();
    if scale > AMOUNT_MAX_SCALE {
        return Err(ValidationError::new(
            "amount",
            format!("must have at most {} decimal places", AMOUNT_MAX_SCALE),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn validates_required_field() {
        assert!(validate_required("field", "value").is_ok());
        assert!(validate_required("field", "   ").is_err());
    }

    #[test]
    fn validates_max_len() {
        assert!(validate_max_len("field", "abc", 3).is_ok());
        assert!(validate_max_len("field", "abcd", 3).is_err());
    }

    #[test]
    fn sanitizes_string() {
        assert_eq!(sanitize_string("  hello\tworld  "), "hello world");
        assert_eq!(sanitize_string(" \n "), "");
        assert_eq!(sanitize_string("ab\u{0000}cd\u{0007}"), "abcd");
    }

    #[test]
    fn validates_currency() {
        assert!(validate_currency("USD").is_ok());
        assert!(validate_currency(" EUR ").is_ok());
        assert!(validate_currency("usd").is_err());
        assert!(validate_currency("USDT").is_err());
        assert!(validate_currency("").is_err());
    }

    #[test]
    fn validates_amount() {
        let positive = BigDecimal::from_str("100.00").expect("valid decimal");
        let fine = BigDecimal::from_str("0.01").expect("valid decimal");
        let too_precise = BigDecimal::from_str("1.005").expect("valid decimal");

        assert!(validate_amount(&positive).is_ok());
        assert!(validate_amount(&fine).is_ok());
        assert!(validate_amount(&too_precise).is_err());
        assert!(validate_amount(&BigDecimal::from(0)).is_err());
        assert!(validate_amount(&BigDecimal::from(-1)).is_err());
    }

    #[test]
    fn validates_user_id() {
        assert!(validate_user_id(1).is_ok());
        assert!(validate_user_id(0).is_err());
    }
}
