use chrono::{DateTime, NaiveDate, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize, Serializer};

use super::{Amount, WalletId};

pub type OperationId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Wallet opened with a zero balance
    Create,
    /// Money arrived in `wallet_to`; `wallet_from` names the payer, if any
    Deposit,
    /// Money left `wallet_to`'s counterparty; the mirror leg of a transfer
    Withdrawal,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Deposit => "deposit",
            OperationKind::Withdrawal => "withdrawal",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "create" => Some(OperationKind::Create),
            "deposit" => Some(OperationKind::Deposit),
            "withdrawal" => Some(OperationKind::Withdrawal),
            _ => None,
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One row of the audit log. Rows are written once, in the same unit of work
/// as the balance change they document, and never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub id: OperationId,
    #[serde(rename = "operation")]
    pub kind: OperationKind,
    pub wallet_from: Option<WalletId>,
    pub wallet_to: WalletId,
    pub amount: Amount,
    #[serde(serialize_with = "serialize_timestamp")]
    pub created_at: DateTime<Utc>,
}

/// RFC 3339 UTC with fixed microseconds: the stored form and the exported form.
pub fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.trunc_subsecs(6).to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn serialize_timestamp<S: Serializer>(
    dt: &DateTime<Utc>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_timestamp(*dt))
}

/// An operation that has not been appended yet. The id is assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOperation {
    pub kind: OperationKind,
    pub wallet_from: Option<WalletId>,
    pub wallet_to: WalletId,
    pub amount: Amount,
    pub created_at: DateTime<Utc>,
}

impl NewOperation {
    pub fn new(
        kind: OperationKind,
        wallet_from: Option<WalletId>,
        wallet_to: WalletId,
        amount: Amount,
    ) -> Self {
        Self {
            kind,
            wallet_from,
            wallet_to,
            amount,
            created_at: Utc::now(),
        }
    }

    /// The entry documenting a freshly opened wallet.
    pub fn create(wallet: WalletId) -> Self {
        Self::new(OperationKind::Create, None, wallet, Amount::ZERO)
    }

    /// The two rows recording one transfer: a deposit `from -> to` and
    /// the mirrored withdrawal `to -> from`, both for the same amount.
    pub fn transfer_pair(from: WalletId, to: WalletId, amount: Amount) -> [Self; 2] {
        let now = Utc::now();
        [
            Self::new(OperationKind::Deposit, Some(from), to, amount).at(now),
            Self::new(OperationKind::Withdrawal, Some(to), from, amount).at(now),
        ]
    }

    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

/// Selection of operations for listing and export. Results are always in id order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationFilter {
    /// Exact calendar-day match on `created_at` (UTC)
    pub date: Option<NaiveDate>,
    pub limit: Option<i64>,
    pub offset: i64,
}

impl OperationFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn on_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    /// Page numbers start at 1. `per_page == 0` turns paging off.
    pub fn paged(mut self, page: u32, per_page: u32) -> Self {
        if per_page == 0 {
            self.limit = None;
            self.offset = 0;
            return self;
        }
        let page = page.max(1);
        self.limit = Some(i64::from(per_page));
        self.offset = i64::from(page - 1) * i64::from(per_page);
        self
    }
}
