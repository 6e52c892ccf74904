// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::path::{Path, PathBuf};

use anyhow::Result;
use tempfile::TempDir;
use wallet_ledger::application::{ExportConfig, LedgerService, ReportService};
use wallet_ledger::domain::{Account, Amount, OperationFilter, WalletId};
use wallet_ledger::storage::Database;

/// A ledger and a report service sharing one temporary database.
pub struct TestLedger {
    pub ledger: LedgerService,
    pub reports: ReportService,
    pub db: Database,
    pub export_dir: PathBuf,
    _temp: TempDir,
}

impl TestLedger {
    pub fn path(&self, name: &str) -> PathBuf {
        self._temp.path().join(name)
    }

    pub async fn balance(&self, wallet_id: WalletId) -> Result<Amount> {
        Ok(self.ledger.account(wallet_id).await?.balance)
    }

    pub async fn operation_count(&self) -> Result<usize> {
        Ok(self.ledger.operations(&OperationFilter::all()).await?.len())
    }

    /// Two fresh accounts; the first one funded with `amount`.
    pub async fn funded_pair(&self, amount: &str) -> Result<(Account, Account)> {
        let alice = self.ledger.create_account("alice@example.com").await?;
        let bob = self.ledger.create_account("bob@example.com").await?;
        let alice = self.ledger.enroll(alice.user_id, dec(amount)).await?;
        Ok((alice, bob))
    }
}

/// Helper to create a ledger with a temporary database
pub async fn test_ledger() -> Result<TestLedger> {
    let temp = TempDir::new()?;
    let db_path = temp.path().join("test.db");
    let db = Database::init(db_path.to_str().unwrap()).await?;

    let export_dir = temp.path().join("exports");
    let reports = ReportService::new(
        db.clone(),
        ExportConfig {
            dir: export_dir.clone(),
            channel_capacity: 1,
        },
    );

    Ok(TestLedger {
        ledger: LedgerService::new(db.clone()),
        reports,
        db,
        export_dir,
        _temp: temp,
    })
}

/// Helper to parse a decimal literal
pub fn dec(s: &str) -> Amount {
    s.parse().unwrap()
}

pub fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(String::from)
        .collect()
}
