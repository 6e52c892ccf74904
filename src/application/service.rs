use tracing::{debug, info, warn};

use crate::domain::{
    Account, Amount, DEFAULT_CURRENCY, NewOperation, Operation, OperationFilter, OperationKind,
    UserId, WalletId, is_plausible_email,
};
use crate::storage::{Database, OperationStore, TxOptions, UnitOfWork, UserStore, WalletStore};

use super::AppError;

/// Application service providing the ledger operations.
/// Every mutating call runs inside one unit of work: all steps commit together or none do.
pub struct LedgerService {
    db: Database,
    currency: String,
    tx_options: TxOptions,
}

impl LedgerService {
    /// Create a new ledger service on top of the given database.
    pub fn new(db: Database) -> Self {
        Self {
            db,
            currency: DEFAULT_CURRENCY.to_string(),
            tx_options: TxOptions::default(),
        }
    }

    /// Currency stamped on wallets opened by this service.
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn with_tx_options(mut self, options: TxOptions) -> Self {
        self.tx_options = options;
        self
    }

    /// Initialize a new database at the given path.
    pub async fn init(database_path: &str) -> Result<Self, AppError> {
        Ok(Self::new(Database::init(database_path).await?))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str) -> Result<Self, AppError> {
        Ok(Self::new(Database::open(database_path).await?))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    async fn begin(&self) -> Result<UnitOfWork, AppError> {
        self.db
            .begin(self.tx_options)
            .await
            .map_err(AppError::Transaction)
    }

    // ========================
    // Ledger operations
    // ========================

    /// Register a user and open their zero-balance wallet.
    pub async fn create_account(&self, email: &str) -> Result<Account, AppError> {
        let email = email.trim();
        if !is_plausible_email(email) {
            return Err(AppError::InvalidEmail(email.to_string()));
        }

        let mut uow = self.begin().await?;
        let result = Self::create_account_in(&mut uow, email, &self.currency).await;
        let account = complete(uow, "create_account", result).await?;

        info!(
            user_id = account.user_id,
            wallet_id = account.wallet_id,
            "account created"
        );
        Ok(account)
    }

    async fn create_account_in(
        uow: &mut UnitOfWork,
        email: &str,
        currency: &str,
    ) -> Result<Account, AppError> {
        let user = uow.users().create(email).await?;
        let wallet = uow.wallets().create(user.id, currency).await?;
        uow.operations()
            .append(&NewOperation::create(wallet.id))
            .await?;

        // Read back through the same transaction.
        uow.wallets()
            .account(wallet.id)
            .await?
            .ok_or(AppError::WalletNotFound(wallet.id))
    }

    /// Add funds to a user's wallet from outside the ledger.
    pub async fn enroll(&self, user_id: UserId, amount: Amount) -> Result<Account, AppError> {
        if amount <= Amount::ZERO {
            return Err(AppError::InvalidAmount(format!(
                "amount must be positive, got {}",
                amount
            )));
        }

        let mut uow = self.begin().await?;
        let result = Self::enroll_in(&mut uow, user_id, amount).await;
        let account = complete(uow, "enroll", result).await?;

        info!(
            user_id,
            wallet_id = account.wallet_id,
            amount = %amount,
            balance = %account.balance,
            "wallet enrolled"
        );
        Ok(account)
    }

    async fn enroll_in(
        uow: &mut UnitOfWork,
        user_id: UserId,
        amount: Amount,
    ) -> Result<Account, AppError> {
        let account = uow
            .users()
            .find_account(user_id)
            .await?
            .ok_or(AppError::UserNotFound(user_id))?;

        uow.wallets().credit(account.wallet_id, amount).await?;
        uow.operations()
            .append(&NewOperation::new(
                OperationKind::Deposit,
                None,
                account.wallet_id,
                amount,
            ))
            .await?;

        uow.wallets()
            .account(account.wallet_id)
            .await?
            .ok_or(AppError::WalletNotFound(account.wallet_id))
    }

    /// Move funds between two wallets. Returns the source wallet id.
    ///
    /// Both balance updates happen before the two log rows are written; the
    /// enclosing unit of work makes the four statements one outcome.
    pub async fn transfer(
        &self,
        wallet_from: WalletId,
        wallet_to: WalletId,
        amount: Amount,
    ) -> Result<WalletId, AppError> {
        if amount <= Amount::ZERO {
            return Err(AppError::InvalidAmount(format!(
                "amount must be positive, got {}",
                amount
            )));
        }
        if wallet_from == wallet_to {
            return Err(AppError::SameWallet(wallet_from));
        }

        let mut uow = self.begin().await?;
        let result = Self::transfer_in(&mut uow, wallet_from, wallet_to, amount).await;
        let source = complete(uow, "transfer", result).await?;

        info!(wallet_from, wallet_to, amount = %amount, "transfer committed");
        Ok(source)
    }

    async fn transfer_in(
        uow: &mut UnitOfWork,
        wallet_from: WalletId,
        wallet_to: WalletId,
        amount: Amount,
    ) -> Result<WalletId, AppError> {
        let source = uow
            .wallets()
            .find(wallet_from)
            .await?
            .ok_or(AppError::WalletNotFound(wallet_from))?;
        let target = uow
            .wallets()
            .find(wallet_to)
            .await?
            .ok_or(AppError::WalletNotFound(wallet_to))?;

        if source.currency != target.currency {
            return Err(AppError::CurrencyMismatch {
                from_currency: source.currency,
                to_currency: target.currency,
            });
        }
        if !source.can_cover(amount) {
            return Err(AppError::InsufficientFunds {
                wallet_id: wallet_from,
                balance: source.balance,
                required: amount,
            });
        }

        uow.wallets().debit(wallet_from, amount).await?;
        uow.wallets().credit(wallet_to, amount).await?;

        for op in NewOperation::transfer_pair(wallet_from, wallet_to, amount) {
            uow.operations().append(&op).await?;
        }

        Ok(wallet_from)
    }

    // ========================
    // Queries
    // ========================

    /// Joined user + wallet view by wallet id.
    pub async fn account(&self, wallet_id: WalletId) -> Result<Account, AppError> {
        let mut conn = self.db.acquire().await?;
        WalletStore::new(&mut conn)
            .account(wallet_id)
            .await?
            .ok_or(AppError::WalletNotFound(wallet_id))
    }

    /// Joined user + wallet view by user id.
    pub async fn account_for_user(&self, user_id: UserId) -> Result<Account, AppError> {
        let mut conn = self.db.acquire().await?;
        UserStore::new(&mut conn)
            .find_account(user_id)
            .await?
            .ok_or(AppError::UserNotFound(user_id))
    }

    /// List operations in log order.
    pub async fn operations(&self, filter: &OperationFilter) -> Result<Vec<Operation>, AppError> {
        let mut conn = self.db.acquire().await?;
        Ok(OperationStore::new(&mut conn).list(filter).await?)
    }
}

/// Commit on success; otherwise roll back and hand the original error back.
/// A failed rollback is logged and swallowed so it never masks the cause.
async fn complete<T>(
    uow: UnitOfWork,
    operation: &'static str,
    result: Result<T, AppError>,
) -> Result<T, AppError> {
    match result {
        Ok(value) => {
            uow.commit().await.map_err(|e| {
                warn!(operation, error = %e, "commit failed, changes discarded");
                AppError::Transaction(e)
            })?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = uow.rollback().await {
                warn!(operation, error = %rollback_err, "rollback failed");
            }
            debug!(operation, error = %err, "unit of work rolled back");
            Err(err)
        }
    }
}
