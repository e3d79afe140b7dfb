use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub currency: String,
}

/// The user snapshot cached under `user:{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub country: Country,
}

/// One-to-one with a user. The balance only moves through
/// `TransactionRepository::update_user_balance`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: i64,
    pub user_id: i64,
    pub balance: BigDecimal,
    pub currency: String,
    pub updated_at: DateTime<Utc>,
}
