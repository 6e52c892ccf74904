use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Amount;

pub type UserId = i64;
pub type WalletId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// A user's balance holder. The balance only ever moves through signed deltas
/// applied by the ledger; nothing sets it directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletId,
    pub user_id: UserId,
    pub balance: Amount,
    pub currency: String,
}

impl Wallet {
    pub fn can_cover(&self, amount: Amount) -> bool {
        self.balance >= amount
    }
}

/// Joined user + wallet view returned by the ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub user_id: UserId,
    pub email: String,
    pub wallet_id: WalletId,
    pub balance: Amount,
    pub currency: String,
}

/// Minimal shape check. Real address validation lives with the request decoding.
pub fn is_plausible_email(email: &str) -> bool {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty(),
        None => false,
    }
}
