//! Transaction domain entity.
//! Framework-agnostic representation of a deposit or withdrawal and the
//! status machine that governs it.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "deposit",
            TransactionType::Withdrawal => "withdrawal",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deposit" => Ok(TransactionType::Deposit),
            "withdrawal" => Ok(TransactionType::Withdrawal),
            _ => Err(UnknownValue(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Success => "success",
            TransactionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    /// Decide what a status callback does to a transaction currently in `self`.
    pub fn transition(self, next: TransactionStatus) -> Result<Transition, TransitionError> {
        match (self, next) {
            (_, TransactionStatus::Pending) => Err(TransitionError::BackToPending),
            (TransactionStatus::Pending, next) => Ok(Transition::Apply(next)),
            (current, _) => Ok(Transition::AlreadyFinal(current)),
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(TransactionStatus::Pending),
            "success" => Ok(TransactionStatus::Success),
            "failed" => Ok(TransactionStatus::Failed),
            _ => Err(UnknownValue(s.to_string())),
        }
    }
}

/// Result of feeding a callback status into the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// pending -> terminal; persist and reconcile.
    Apply(TransactionStatus),
    /// The transaction is already terminal; the callback is a no-op.
    AlreadyFinal(TransactionStatus),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("a transaction cannot be moved back to pending")]
    BackToPending,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognised value: {0}")]
pub struct UnknownValue(pub String);

/// Fields needed to record a new transaction; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub amount: BigDecimal,
    pub currency: String,
    pub kind: TransactionType,
    pub user_id: i64,
    pub gateway_name: String,
    pub country_name: String,
}

impl NewTransaction {
    pub fn deposit(
        amount: BigDecimal,
        currency: String,
        user_id: i64,
        gateway_name: String,
        country_name: String,
    ) -> Self {
        Self {
            amount,
            currency,
            kind: TransactionType::Deposit,
            user_id,
            gateway_name,
            country_name,
        }
    }

    pub fn withdrawal(
        amount: BigDecimal,
        currency: String,
        user_id: i64,
        gateway_name: String,
        country_name: String,
    ) -> Self {
        Self {
            amount,
            currency,
            kind: TransactionType::Withdrawal,
            user_id,
            gateway_name,
            country_name,
        }
    }
}

/// Domain entity representing a transaction. Transactions are never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub amount: BigDecimal,
    pub currency: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub status: TransactionStatus,
    pub user_id: i64,
    pub gateway_name: String,
    pub country_name: String,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Materialise a freshly inserted row. Every transaction starts pending.
    pub fn from_new(id: i64, new: NewTransaction, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            amount: new.amount,
            currency: new.currency,
            kind: new.kind,
            status: TransactionStatus::Pending,
            user_id: new.user_id,
            gateway_name: new.gateway_name,
            country_name: new.country_name,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_moves_to_terminal() {
        assert_eq!(
            TransactionStatus::Pending.transition(TransactionStatus::Success),
            Ok(Transition::Apply(TransactionStatus::Success))
        );
        assert_eq!(
            TransactionStatus::Pending.transition(TransactionStatus::Failed),
            Ok(Transition::Apply(TransactionStatus::Failed))
        );
    }

    #[test]
    fn test_terminal_is_immutable() {
        assert_eq!(
            TransactionStatus::Success.transition(TransactionStatus::Success),
            Ok(Transition::AlreadyFinal(TransactionStatus::Success))
        );
        assert_eq!(
            TransactionStatus::Success.transition(TransactionStatus::Failed),
            Ok(Transition::AlreadyFinal(TransactionStatus::Success))
        );
        assert_eq!(
            TransactionStatus::Failed.transition(TransactionStatus::Pending),
            Err(TransitionError::BackToPending)
        );
    }

    #[test]
    fn test_status_parsing_ignores_case() {
        assert_eq!("FAILED".parse::<TransactionStatus>(), Ok(TransactionStatus::Failed));
        assert_eq!(" success ".parse::<TransactionStatus>(), Ok(TransactionStatus::Success));
        assert!("refunded".parse::<TransactionStatus>().is_err());
    }

    #[test]
    fn test_transaction_serialises_type_field() {
        let tx = Transaction::from_new(
            7,
            NewTransaction::deposit(
                "100.00".parse().unwrap(),
                "USD".to_string(),
                1,
                "stripe".to_string(),
                "Nigeria".to_string(),
            ),
            Utc::now(),
        );
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["type"], "deposit");
        assert_eq!(json["status"], "pending");
    }
}
