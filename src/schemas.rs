use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use crate::domain::TransactionStatus;
use crate::validation::{
    sanitize_string, validate_amount, validate_currency, validate_max_len, validate_required,
    validate_user_id, ValidationError, ValidationResult, AUTH_CODE_MAX_LEN, GATEWAY_NAME_MAX_LEN,
    RECEIVING_ACCOUNT_MAX_LEN,
};

/// Wire format the caller prefers. Also selects the event topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataFormat {
    #[default]
    Json,
    Xml,
}

impl DataFormat {
    /// `Accept` wins over `Content-Type`; anything mentioning xml selects XML.
    pub fn from_headers(accept: Option<&str>, content_type: Option<&str>) -> Self {
        let hint = accept
            .filter(|value| !value.trim().is_empty() && value.trim() != "*/*")
            .or(content_type);
        match hint {
            Some(value) if Self::prefers_xml(value) => DataFormat::Xml,
            _ => DataFormat::Json,
        }
    }

    fn prefers_xml(header: &str) -> bool {
        let mut best: Option<(f32, DataFormat)> = None;
        for part in header.split(',') {
            let mut pieces = part.split(";q=");
            let mime = pieces.next().unwrap_or_default().trim();
            let quality = pieces
                .next()
                .and_then(|q| q.trim().parse::<f32>().ok())
                .unwrap_or(1.0);
            let format = match mime {
                "application/json" => DataFormat::Json,
                "text/xml" | "application/xml" | "application/soap+xml" => DataFormat::Xml,
                _ => continue,
            };
            if best.map_or(true, |(q, _)| quality > q) {
                best = Some((quality, format));
            }
        }
        matches!(best, Some((_, DataFormat::Xml)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositRequest {
    pub amount: BigDecimal,
    pub user_id: i64,
    pub currency: String,
}

impl DepositRequest {
    pub fn validate(&mut self) -> ValidationResult {
        validate_amount(&self.amount)?;
        validate_user_id(self.user_id)?;
        self.currency = sanitize_string(&self.currency);
        validate_currency(&self.currency)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub amount: BigDecimal,
    pub user_id: i64,
    pub payment_gateway_name: String,
    #[serde(rename = "receiving_account_id")]
    pub receiving_account: String,
    pub authentication_code: String,
}

impl WithdrawalRequest {
    pub fn validate(&mut self) -> ValidationResult {
        validate_amount(&self.amount)?;
        validate_user_id(self.user_id)?;

        self.payment_gateway_name = sanitize_string(&self.payment_gateway_name).to_lowercase();
        validate_required("payment_gateway_name", &self.payment_gateway_name)?;
        validate_max_len(
            "payment_gateway_name",
            &self.payment_gateway_name,
            GATEWAY_NAME_MAX_LEN,
        )?;

        self.receiving_account = sanitize_string(&self.receiving_account);
        validate_required("receiving_account_id", &self.receiving_account)?;
        validate_max_len(
            "receiving_account_id",
            &self.receiving_account,
            RECEIVING_ACCOUNT_MAX_LEN,
        )?;

        validate_required("authentication_code", &self.authentication_code)?;
        validate_max_len(
            "authentication_code",
            &self.authentication_code,
            AUTH_CODE_MAX_LEN,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackRequest {
    pub transaction_id: i64,
    pub status: String,
}

impl CallbackRequest {
    /// The reported status; callbacks may only report a terminal one.
    pub fn parsed_status(&self) -> Result<TransactionStatus, ValidationError> {
        let status = self
            .status
            .parse::<TransactionStatus>()
            .map_err(|_| ValidationError::new("status", "must be one of: success, failed"))?;
        if !status.is_terminal() {
            return Err(ValidationError::new("status", "must be one of: success, failed"));
        }
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_defaults_to_json() {
        assert_eq!(DataFormat::from_headers(None, None), DataFormat::Json);
        assert_eq!(
            DataFormat::from_headers(Some("*/*"), Some("application/json")),
            DataFormat::Json
        );
    }

    #[test]
    fn test_format_honours_accept_quality() {
        assert_eq!(
            DataFormat::from_headers(Some("application/json;q=0.4, application/xml;q=0.9"), None),
            DataFormat::Xml
        );
        assert_eq!(
            DataFormat::from_headers(Some("text/xml;q=0.2, application/json"), None),
            DataFormat::Json
        );
    }

    #[test]
    fn test_format_falls_back_to_content_type() {
        assert_eq!(
            DataFormat::from_headers(None, Some("application/soap+xml")),
            DataFormat::Xml
        );
    }

    #[test]
    fn test_callback_rejects_pending() {
        let request = CallbackRequest {
            transaction_id: 1,
            status: "pending".to_string(),
        };
        assert!(request.parsed_status().is_err());
    }

    #[test]
    fn test_withdrawal_normalises_gateway_name() {
        let mut request = WithdrawalRequest {
            amount: "20".parse().unwrap(),
            user_id: 3,
            payment_gateway_name: " Stripe ".to_string(),
            receiving_account: "acct-9".to_string(),
            authentication_code: "123456".to_string(),
        };
        request.validate().unwrap();
        assert_eq!(request.payment_gateway_name, "stripe");
    }

    #[test]
    fn test_deposit_rejects_zero_user() {
        let mut request = DepositRequest {
            amount: "100.00".parse().unwrap(),
            user_id: 0,
            currency: "USD".to_string(),
        };
        assert_eq!(request.validate().unwrap_err().field, "user_id");
    }
}
