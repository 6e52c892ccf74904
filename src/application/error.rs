use thiserror::Error;

use crate::domain::{Amount, UserId, WalletId};
use crate::io::PipelineError;
use crate::storage::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    // === Not found ===
    #[error("User not found: {0}")]
    UserNotFound(UserId),

    #[error("Wallet not found: {0}")]
    WalletNotFound(WalletId),

    // === Validation ===
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid email: {0:?}")]
    InvalidEmail(String),

    #[error("Source wallet equals destination wallet: {0}")]
    SameWallet(WalletId),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Insufficient funds in wallet {wallet_id}: balance {balance}, required {required}")]
    InsufficientFunds {
        wallet_id: WalletId,
        balance: Amount,
        required: Amount,
    },

    #[error("Balance of wallet {0} would exceed the largest representable amount")]
    BalanceOverflow(WalletId),

    #[error("Currency mismatch between wallets: {from_currency} vs {to_currency}")]
    CurrencyMismatch {
        from_currency: String,
        to_currency: String,
    },

    // === Failures ===
    #[error("Persistence failure: {0}")]
    Persistence(StoreError),

    #[error("Transaction failure: {0}")]
    Transaction(#[source] sqlx::Error),

    #[error("Export failed: {0}")]
    Export(#[from] PipelineError),

    #[error("Report file error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Stable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::UserNotFound(_) => "USER_NOT_FOUND",
            AppError::WalletNotFound(_) => "WALLET_NOT_FOUND",
            AppError::InvalidAmount(_) => "INVALID_AMOUNT",
            AppError::InvalidEmail(_) => "INVALID_EMAIL",
            AppError::SameWallet(_) => "SAME_WALLET",
            AppError::InvalidRequest(_) => "INVALID_REQUEST",
            AppError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            AppError::BalanceOverflow(_) => "BALANCE_OVERFLOW",
            AppError::CurrencyMismatch { .. } => "CURRENCY_MISMATCH",
            AppError::Persistence(_) => "PERSISTENCE_ERROR",
            AppError::Transaction(_) => "TRANSACTION_ERROR",
            AppError::Export(_) => "EXPORT_ERROR",
            AppError::Io(_) => "REPORT_FILE_ERROR",
        }
    }

    /// HTTP status suggestion for the transport layer.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::UserNotFound(_) | AppError::WalletNotFound(_) => 404,
            AppError::InvalidAmount(_)
            | AppError::InvalidEmail(_)
            | AppError::SameWallet(_)
            | AppError::InvalidRequest(_) => 400,
            AppError::InsufficientFunds { .. }
            | AppError::BalanceOverflow(_)
            | AppError::CurrencyMismatch { .. } => 422,
            AppError::Persistence(_)
            | AppError::Transaction(_)
            | AppError::Export(_)
            | AppError::Io(_) => 500,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.http_status() == 404
    }

    pub fn is_validation(&self) -> bool {
        matches!(self.http_status(), 400 | 422)
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { entity: "user", id } => AppError::UserNotFound(id),
            StoreError::NotFound {
                entity: "wallet",
                id,
            } => AppError::WalletNotFound(id),
            StoreError::BalanceOverflow { id } => AppError::BalanceOverflow(id),
            StoreError::InvalidAmount(amount) => {
                AppError::InvalidAmount(format!("amount must be positive, got {}", amount))
            }
            other => AppError::Persistence(other),
        }
    }
}
