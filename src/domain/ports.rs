use async_trait::async_trait;

use crate::domain::errors::LedgerError;
use crate::domain::symbols::{DICE_COUNT, Symbol};

/// Kind of balance mutation recorded in the transaction log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    BetWin,
    BetLoss,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdrawal => "withdrawal",
            TransactionKind::BetWin => "bet_win",
            TransactionKind::BetLoss => "bet_loss",
        }
    }
}

/// One balance mutation to apply atomically.
///
/// The caller computes the target balance; the ledger validates it, writes
/// it, and appends the audit record in the same database transaction. There
/// is no idempotency key, so the caller must apply each settlement exactly
/// once and never retry a failed write.
#[derive(Debug, Clone)]
pub struct LedgerUpdate {
    pub user_id: i64,
    pub new_balance_cents: i64,
    pub kind: TransactionKind,
    pub amount_cents: i64,
    pub description: String,
}

/// Port for the durable balance store used by game settlement and deposits.
#[async_trait]
pub trait BalanceLedger: Send + Sync {
    /// Reads the committed balance for a user.
    async fn fetch_balance(&self, user_id: i64) -> Result<i64, LedgerError>;

    /// Applies one mutation atomically and returns the committed balance.
    async fn apply_transaction(&self, update: LedgerUpdate) -> Result<i64, LedgerError>;
}

/// Port for wall-clock time, injected so deadline math is testable.
pub trait Clock: Send + Sync {
    fn now_epoch_millis(&self) -> u64;
}

/// Port for drawing one round of dice.
pub trait DiceRoller: Send + Sync {
    /// Draws six independent uniform samples from the symbol alphabet.
    fn roll(&self) -> [Symbol; DICE_COUNT];
}
