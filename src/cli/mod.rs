use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::application::{ExportConfig, ExportRequest, LedgerService, ReportService};
use crate::domain::{Account, Operation, format_amount, parse_amount};
use crate::storage::TxOptions;

/// Wallet ledger - accounts, transfers and an auditable operation log
#[derive(Parser)]
#[command(name = "wallet-ledger")]
#[command(about = "A wallet ledger with an append-only operation log")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, env = "LEDGER_DATABASE", default_value = "ledger.db", global = true)]
    pub database: String,

    /// Directory for exported reports (system temp dir if omitted)
    #[arg(long, env = "LEDGER_EXPORT_DIR", global = true)]
    pub export_dir: Option<PathBuf>,

    /// Give up on a transaction that cannot start within this many milliseconds
    #[arg(long, env = "LEDGER_BEGIN_TIMEOUT_MS", global = true)]
    pub begin_timeout_ms: Option<u64>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Account management commands
    #[command(subcommand)]
    Account(AccountCommands),

    /// Add funds to a user's wallet
    Enroll {
        /// User ID
        user_id: i64,

        /// Amount to add (e.g., "50.00" or "50")
        amount: String,
    },

    /// Move funds between two wallets
    Transfer {
        /// Amount to transfer (e.g., "50.00" or "50")
        amount: String,

        /// Source wallet ID
        #[arg(long)]
        from: i64,

        /// Destination wallet ID
        #[arg(long)]
        to: i64,
    },

    /// List operations from the audit log
    Operations {
        /// Exact day (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,

        /// Page number, starting at 1
        #[arg(long)]
        page: Option<u32>,

        /// Operations per page (0 disables paging)
        #[arg(long)]
        per_page: Option<u32>,
    },

    /// Export operations to CSV or JSON lines
    Export {
        /// Format: csv, json
        #[arg(short, long, default_value = "json")]
        format: String,

        /// Output file (a new file in the export directory if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Exact day (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,

        /// Page number, starting at 1
        #[arg(long)]
        page: Option<u32>,

        /// Operations per page (0 disables paging)
        #[arg(long)]
        per_page: Option<u32>,
    },
}

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Register a user and open their wallet
    Create {
        /// Email address (must be unique)
        email: String,

        /// Currency code for the new wallet
        #[arg(short, long, default_value = "USD")]
        currency: String,
    },

    /// Show an account by wallet ID
    Show {
        /// Wallet ID
        wallet_id: i64,
    },
}

impl Cli {
    fn export_config(&self) -> ExportConfig {
        let mut config = ExportConfig::default();
        if let Some(dir) = &self.export_dir {
            config.dir = dir.clone();
        }
        config
    }

    fn tx_options(&self) -> TxOptions {
        match self.begin_timeout_ms {
            Some(ms) => TxOptions::default().with_begin_timeout(Duration::from_millis(ms)),
            None => TxOptions::default(),
        }
    }

    pub async fn run(self) -> Result<()> {
        let export_config = self.export_config();
        let tx_options = self.tx_options();

        match self.command {
            Commands::Init => {
                LedgerService::init(&self.database).await?;
                println!("Database initialized: {}", self.database);
            }

            Commands::Account(cmd) => {
                let service = connect(&self.database, tx_options).await?;
                run_account_command(service, cmd).await?;
            }

            Commands::Enroll { user_id, amount } => {
                let service = connect(&self.database, tx_options).await?;
                let amount =
                    parse_amount(&amount).context("Invalid amount format. Use '50.00' or '50'")?;

                let account = service.enroll(user_id, amount).await?;
                println!("Enrolled {} into wallet {}", format_amount(amount), account.wallet_id);
                print_account(&account);
            }

            Commands::Transfer { amount, from, to } => {
                let service = connect(&self.database, tx_options).await?;
                let amount =
                    parse_amount(&amount).context("Invalid amount format. Use '50.00' or '50'")?;

                service.transfer(from, to, amount).await?;
                let source = service.account(from).await?;
                println!(
                    "Transferred {} {}: wallet {} -> wallet {}",
                    format_amount(amount),
                    source.currency,
                    from,
                    to
                );
                print_account(&source);
            }

            Commands::Operations {
                date,
                page,
                per_page,
            } => {
                let service = connect(&self.database, tx_options).await?;
                let request = ExportRequest {
                    format: None,
                    page,
                    per_page,
                    date,
                };
                let operations = service.operations(&request.filter()?).await?;
                print_operations(&operations);
            }

            Commands::Export {
                format,
                output,
                date,
                page,
                per_page,
            } => {
                let service = connect(&self.database, tx_options).await?;
                let reports = ReportService::new(service.database().clone(), export_config);
                let request = ExportRequest {
                    format: Some(format),
                    page,
                    per_page,
                    date,
                };

                match output {
                    Some(path) => {
                        let summary = reports
                            .export_to(&path, request.format()?, request.filter()?)
                            .await
                            .with_context(|| {
                                format!("Failed to export to {}", path.display())
                            })?;
                        eprintln!("Exported {} operations", summary.written);
                        println!("{}", path.display());
                    }
                    None => {
                        let report = reports.export(&request).await?;
                        eprintln!(
                            "Exported {} operations ({} bytes, {})",
                            report.summary.written, report.size, report.content_type
                        );
                        println!("{}", report.path.display());
                    }
                }
            }
        }

        Ok(())
    }
}

async fn connect(database: &str, tx_options: TxOptions) -> Result<LedgerService> {
    Ok(LedgerService::connect(database).await?.with_tx_options(tx_options))
}

async fn run_account_command(service: LedgerService, cmd: AccountCommands) -> Result<()> {
    match cmd {
        AccountCommands::Create { email, currency } => {
            let service = service.with_currency(currency.to_uppercase());
            let account = service.create_account(&email).await?;
            println!("Created account for {}", account.email);
            print_account(&account);
        }

        AccountCommands::Show { wallet_id } => {
            let account = service.account(wallet_id).await?;
            print_account(&account);
        }
    }
    Ok(())
}

fn print_account(account: &Account) {
    println!("  User ID:   {}", account.user_id);
    println!("  Email:     {}", account.email);
    println!("  Wallet ID: {}", account.wallet_id);
    println!(
        "  Balance:   {} {}",
        format_amount(account.balance),
        account.currency
    );
}

fn print_operations(operations: &[Operation]) {
    if operations.is_empty() {
        println!("No operations found.");
        return;
    }

    println!(
        "{:<8} {:<12} {:>8} {:>8} {:>14}  {}",
        "ID", "OPERATION", "FROM", "TO", "AMOUNT", "CREATED"
    );
    println!("{}", "-".repeat(76));
    for op in operations {
        println!(
            "{:<8} {:<12} {:>8} {:>8} {:>14}  {}",
            op.id,
            op.kind.as_str(),
            op.wallet_from
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".to_string()),
            op.wallet_to,
            format_amount(op.amount),
            op.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
}
