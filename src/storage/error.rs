use thiserror::Error;

use crate::domain::{Amount, WalletId};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{context}: {source}")]
    Query {
        context: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("amount must be positive, got {0}")]
    InvalidAmount(Amount),

    #[error("balance of wallet {id} would overflow")]
    BalanceOverflow { id: WalletId },

    #[error("invalid {column} value: {value:?}")]
    Decode { column: &'static str, value: String },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Attach a short description of the failed statement to a driver error.
pub(crate) trait QueryContext<T> {
    fn context(self, context: &'static str) -> Result<T, StoreError>;
}

impl<T> QueryContext<T> for Result<T, sqlx::Error> {
    fn context(self, context: &'static str) -> Result<T, StoreError> {
        self.map_err(|source| StoreError::Query { context, source })
    }
}
