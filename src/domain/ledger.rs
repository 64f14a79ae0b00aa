//! Wallet and Transaction ledger types plus the transaction transition table.
//!
//! The transition table is pure: it decides whether a requested status change is
//! legal and what balance effect realizing it has. The store applies the effect
//! inside the same database transaction as the status change.

use crate::domain::{Decimal, TimeMs, UserId, WalletId};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    EntryFee,
    Winnings,
    Refund,
    Adjustment,
}

/// Which way a realized transaction moves the wallet balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Credit,
    Debit,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "DEPOSIT",
            TransactionType::Withdrawal => "WITHDRAWAL",
            TransactionType::EntryFee => "ENTRY_FEE",
            TransactionType::Winnings => "WINNINGS",
            TransactionType::Refund => "REFUND",
            TransactionType::Adjustment => "ADJUSTMENT",
        }
    }

    /// Amounts are stored positive; the type carries the direction.
    pub fn direction(&self) -> Direction {
        match self {
            TransactionType::Withdrawal | TransactionType::EntryFee => Direction::Debit,
            TransactionType::Deposit
            | TransactionType::Winnings
            | TransactionType::Refund
            | TransactionType::Adjustment => Direction::Credit,
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEPOSIT" => Ok(TransactionType::Deposit),
            "WITHDRAWAL" => Ok(TransactionType::Withdrawal),
            "ENTRY_FEE" => Ok(TransactionType::EntryFee),
            "WINNINGS" => Ok(TransactionType::Winnings),
            "REFUND" => Ok(TransactionType::Refund),
            "ADJUSTMENT" => Ok(TransactionType::Adjustment),
            other => Err(format!("unknown transaction type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    RequiresApproval,
    Processing,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::RequiresApproval => "REQUIRES_APPROVAL",
            TransactionStatus::Processing => "PROCESSING",
            TransactionStatus::Completed => "COMPLETED",
            TransactionStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Completed | TransactionStatus::Failed)
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(TransactionStatus::Pending),
            "REQUIRES_APPROVAL" => Ok(TransactionStatus::RequiresApproval),
            "PROCESSING" => Ok(TransactionStatus::Processing),
            "COMPLETED" => Ok(TransactionStatus::Completed),
            "FAILED" => Ok(TransactionStatus::Failed),
            other => Err(format!("unknown transaction status: {}", other)),
        }
    }
}

/// One ledger account per user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub id: WalletId,
    pub user_id: UserId,
    pub balance: Decimal,
    pub currency: String,
    /// Bumped on every balance mutation; compare-and-swap guard.
    pub version: i64,
}

/// An append-only ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub wallet_id: WalletId,
    pub user_id: UserId,
    pub tx_type: TransactionType,
    pub status: TransactionStatus,
    pub amount: Decimal,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub created_at: TimeMs,
    pub updated_at: TimeMs,
}

/// Input for appending a transaction.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub user_id: UserId,
    pub tx_type: TransactionType,
    pub amount: Decimal,
    /// Unique when present; a second insert with the same reference returns the first row.
    pub external_reference: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl NewTransaction {
    pub fn new(user_id: UserId, tx_type: TransactionType, amount: Decimal) -> Self {
        Self {
            user_id,
            tx_type,
            amount,
            external_reference: None,
            metadata: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.external_reference = Some(reference.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Status a freshly requested transaction of this type starts in.
    pub fn initial_status(&self) -> TransactionStatus {
        match self.tx_type {
            TransactionType::Withdrawal => TransactionStatus::RequiresApproval,
            _ => TransactionStatus::Pending,
        }
    }
}

/// Largest single amount the ledger accepts, in whole currency units.
///
/// Keeps every balance and prize pool far inside `Decimal`'s range.
pub const MAX_AMOUNT_UNITS: i64 = 1_000_000_000;

/// Why a balance effect could not be realized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectRefused {
    InsufficientBalance,
    Overflow,
}

/// Balance effect of realizing a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceEffect {
    None,
    Credit,
    /// Guarded: falls back to `FAILED` when the balance cannot cover it.
    Debit,
}

impl BalanceEffect {
    /// New balance after the effect. A debit never takes the balance negative.
    pub fn apply(&self, balance: Decimal, amount: Decimal) -> Result<Decimal, EffectRefused> {
        match self {
            BalanceEffect::None => Ok(balance),
            BalanceEffect::Credit => balance.checked_add(amount).ok_or(EffectRefused::Overflow),
            BalanceEffect::Debit if balance >= amount => Ok(balance - amount),
            BalanceEffect::Debit => Err(EffectRefused::InsufficientBalance),
        }
    }

    fn for_direction(direction: Direction) -> Self {
        match direction {
            Direction::Credit => BalanceEffect::Credit,
            Direction::Debit => BalanceEffect::Debit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionPlan {
    /// Already in the target status, or settled. No mutation.
    Unchanged(TransactionStatus),
    Apply(BalanceEffect),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal transition {from} -> {to} for {tx_type} transaction")]
pub struct IllegalTransition {
    pub tx_type: TransactionType,
    pub from: TransactionStatus,
    pub to: TransactionStatus,
}

/// Decide what moving a transaction of `tx_type` from `from` to `to` means.
pub fn plan_transition(
    tx_type: TransactionType,
    from: TransactionStatus,
    to: TransactionStatus,
) -> Result<TransitionPlan, IllegalTransition> {
    use TransactionStatus::*;

    if from == to || from.is_terminal() {
        return Ok(TransitionPlan::Unchanged(from));
    }

    let effect = match (from, to) {
        (Pending, Completed) => BalanceEffect::for_direction(tx_type.direction()),
        (Pending, Failed) | (RequiresApproval, Failed) => BalanceEffect::None,
        (RequiresApproval, Processing) if tx_type.direction() == Direction::Debit => {
            BalanceEffect::Debit
        }
        (Processing, Completed) => BalanceEffect::None,
        _ => return Err(IllegalTransition { tx_type, from, to }),
    };

    Ok(TransitionPlan::Apply(effect))
}

#[cfg(test)]
mod tests {
    use super::*;
    use TransactionStatus::*;

    #[test]
    fn deposit_confirmation_credits() {
        assert_eq!(
            plan_transition(TransactionType::Deposit, Pending, Completed).unwrap(),
            TransitionPlan::Apply(BalanceEffect::Credit)
        );
    }

    #[test]
    fn withdrawal_approval_debits_and_payout_does_not() {
        assert_eq!(
            plan_transition(TransactionType::Withdrawal, RequiresApproval, Processing).unwrap(),
            TransitionPlan::Apply(BalanceEffect::Debit)
        );
        assert_eq!(
            plan_transition(TransactionType::Withdrawal, Processing, Completed).unwrap(),
            TransitionPlan::Apply(BalanceEffect::None)
        );
    }

    #[test]
    fn rejections_have_no_effect() {
        assert_eq!(
            plan_transition(TransactionType::Deposit, Pending, Failed).unwrap(),
            TransitionPlan::Apply(BalanceEffect::None)
        );
        assert_eq!(
            plan_transition(TransactionType::Withdrawal, RequiresApproval, Failed).unwrap(),
            TransitionPlan::Apply(BalanceEffect::None)
        );
    }

    #[test]
    fn reapplying_is_unchanged() {
        assert_eq!(
            plan_transition(TransactionType::Deposit, Completed, Completed).unwrap(),
            TransitionPlan::Unchanged(Completed)
        );
        assert_eq!(
            plan_transition(TransactionType::Withdrawal, Processing, Processing).unwrap(),
            TransitionPlan::Unchanged(Processing)
        );
        assert_eq!(
            plan_transition(TransactionType::Withdrawal, Failed, Processing).unwrap(),
            TransitionPlan::Unchanged(Failed)
        );
    }

    #[test]
    fn illegal_transitions_are_rejected() {
        assert!(plan_transition(TransactionType::Deposit, Pending, Processing).is_err());
        assert!(plan_transition(TransactionType::Deposit, RequiresApproval, Processing).is_err());
        assert!(plan_transition(TransactionType::Withdrawal, Processing, Failed).is_err());
        assert!(plan_transition(TransactionType::Withdrawal, RequiresApproval, Completed).is_err());
    }

    #[test]
    fn debit_guard_refuses_overdraft() {
        let balance = Decimal::from_i64(300);
        assert_eq!(
            BalanceEffect::Debit.apply(balance, Decimal::from_i64(500)),
            Err(EffectRefused::InsufficientBalance)
        );
        assert_eq!(
            BalanceEffect::Debit.apply(balance, Decimal::from_i64(300)),
            Ok(Decimal::zero())
        );
        assert_eq!(
            BalanceEffect::Credit.apply(balance, Decimal::from_i64(1)),
            Ok(Decimal::from_i64(301))
        );
    }

    #[test]
    fn credit_overflow_is_refused() {
        let huge = Decimal::from_str_canonical("79228162514264337593543950335").unwrap();
        assert_eq!(
            BalanceEffect::Credit.apply(huge, Decimal::from_i64(1)),
            Err(EffectRefused::Overflow)
        );
    }

    #[test]
    fn withdrawal_starts_awaiting_approval() {
        let req = NewTransaction::new(
            UserId::new("u1"),
            TransactionType::Withdrawal,
            Decimal::from_i64(10),
        );
        assert_eq!(req.initial_status(), RequiresApproval);
        let dep = NewTransaction::new(UserId::new("u1"), TransactionType::Deposit, Decimal::from_i64(10));
        assert_eq!(dep.initial_status(), Pending);
    }

    #[test]
    fn status_serializes_screaming_snake() {
        assert_eq!(
            serde_json::to_string(&RequiresApproval).unwrap(),
            "\"REQUIRES_APPROVAL\""
        );
        assert_eq!("entry_fee".parse::<TransactionType>().unwrap(), TransactionType::EntryFee);
    }
}
