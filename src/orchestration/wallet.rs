//! Capability-checked wallet flows.
//!
//! The shell resolves identity and hands in a [`Caller`]; this layer decides
//! what that caller may do and drives the ledger store. Payment gateway
//! callbacks (deposit confirmation, payout completion) arrive as an admin
//! caller.

use crate::db::{Repository, StoreError, TransactionFilter, TransitionOutcome};
use crate::domain::{
    Decimal, Entry, LeagueId, NewTransaction, TeamId, Transaction, TransactionStatus,
    TransactionType, UserId, Wallet,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: UserId,
    pub is_admin: bool,
}

impl Caller {
    pub fn user(user_id: UserId) -> Self {
        Self {
            user_id,
            is_admin: false,
        }
    }

    pub fn admin(user_id: UserId) -> Self {
        Self {
            user_id,
            is_admin: true,
        }
    }

    fn can_act_for(&self, user_id: &UserId) -> bool {
        self.is_admin || &self.user_id == user_id
    }
}

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<sqlx::Error> for WalletError {
    fn from(err: sqlx::Error) -> Self {
        WalletError::Store(StoreError::Db(err))
    }
}

#[derive(Clone)]
pub struct WalletService {
    repo: Arc<Repository>,
    currency: String,
}

impl WalletService {
    pub fn new(repo: Arc<Repository>, currency: String) -> Self {
        Self { repo, currency }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn wallet(&self, caller: &Caller, user_id: &UserId) -> Result<Wallet, WalletError> {
        require_owner(caller, user_id)?;
        self.repo
            .get_wallet(user_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("wallet for {}", user_id)).into())
    }

    pub async fn transaction(&self, caller: &Caller, id: &str) -> Result<Transaction, WalletError> {
        let tx = self
            .repo
            .get_transaction(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("transaction {}", id)))?;
        // Hide existence from other users.
        if !caller.can_act_for(&tx.user_id) {
            return Err(StoreError::NotFound(format!("transaction {}", id)).into());
        }
        Ok(tx)
    }

    /// List transactions. Non-admin callers only ever see their own.
    pub async fn transactions(
        &self,
        caller: &Caller,
        mut filter: TransactionFilter,
    ) -> Result<Vec<Transaction>, WalletError> {
        if !caller.is_admin {
            if let Some(requested) = &filter.user_id {
                require_owner(caller, requested)?;
            }
            filter.user_id = Some(caller.user_id.clone());
        }
        Ok(self.repo.list_transactions(&filter).await?)
    }

    // =========================================================================
    // Deposits
    // =========================================================================

    /// Record a pending deposit for the caller's wallet.
    ///
    /// Idempotent on the gateway's reference: a retried request returns the
    /// original transaction.
    pub async fn request_deposit(
        &self,
        caller: &Caller,
        amount: Decimal,
        gateway_reference: &str,
    ) -> Result<Transaction, WalletError> {
        let new = NewTransaction::new(caller.user_id.clone(), TransactionType::Deposit, amount)
            .with_reference(gateway_reference);
        Ok(self.repo.create_transaction(&new, &self.currency).await?)
    }

    /// Gateway confirmed the payment: credit the wallet once.
    pub async fn confirm_deposit(
        &self,
        caller: &Caller,
        tx_id: &str,
    ) -> Result<TransitionOutcome, WalletError> {
        self.gateway_transition(caller, tx_id, TransactionType::Deposit, TransactionStatus::Completed, None)
            .await
    }

    pub async fn fail_deposit(
        &self,
        caller: &Caller,
        tx_id: &str,
        reason: Option<&str>,
    ) -> Result<TransitionOutcome, WalletError> {
        self.gateway_transition(caller, tx_id, TransactionType::Deposit, TransactionStatus::Failed, reason)
            .await
    }

    // =========================================================================
    // Withdrawals
    // =========================================================================

    /// Ask for a payout to the caller's bank account. The funds stay in the
    /// wallet until an admin approves.
    pub async fn request_withdrawal(
        &self,
        caller: &Caller,
        amount: Decimal,
        bank_details: serde_json::Value,
    ) -> Result<Transaction, WalletError> {
        let wallet = self.repo.ensure_wallet(&caller.user_id, &self.currency).await?;
        if wallet.balance < amount {
            return Err(StoreError::InsufficientBalance {
                available: wallet.balance,
                requested: amount,
            }
            .into());
        }

        let new = NewTransaction::new(caller.user_id.clone(), TransactionType::Withdrawal, amount)
            .with_metadata(serde_json::json!({ "bank": bank_details }));
        Ok(self.repo.create_transaction(&new, &self.currency).await?)
    }

    /// Approve a withdrawal and debit the wallet. Declined, and moved to
    /// `FAILED`, when the balance no longer covers it.
    pub async fn approve_withdrawal(
        &self,
        caller: &Caller,
        tx_id: &str,
    ) -> Result<TransitionOutcome, WalletError> {
        require_admin(caller, "approve withdrawals")?;
        self.expect_type(tx_id, TransactionType::Withdrawal).await?;
        let note = format!("approved by {}", caller.user_id);
        Ok(self
            .repo
            .transition_transaction(tx_id, TransactionStatus::Processing, Some(&note))
            .await?)
    }

    pub async fn reject_withdrawal(
        &self,
        caller: &Caller,
        tx_id: &str,
        reason: Option<&str>,
    ) -> Result<TransitionOutcome, WalletError> {
        require_admin(caller, "reject withdrawals")?;
        self.expect_type(tx_id, TransactionType::Withdrawal).await?;
        let note = match reason {
            Some(reason) => format!("rejected by {}: {}", caller.user_id, reason),
            None => format!("rejected by {}", caller.user_id),
        };
        Ok(self
            .repo
            .transition_transaction(tx_id, TransactionStatus::Failed, Some(&note))
            .await?)
    }

    /// Gateway paid out an approved withdrawal. No balance effect; the debit
    /// happened at approval.
    pub async fn complete_withdrawal(
        &self,
        caller: &Caller,
        tx_id: &str,
    ) -> Result<TransitionOutcome, WalletError> {
        self.gateway_transition(caller, tx_id, TransactionType::Withdrawal, TransactionStatus::Completed, None)
            .await
    }

    // =========================================================================
    // Admin adjustments and league entry
    // =========================================================================

    /// Credit a wallet by hand. Recorded as an already completed `ADJUSTMENT`.
    pub async fn adjust(
        &self,
        caller: &Caller,
        user_id: &UserId,
        amount: Decimal,
        reason: &str,
    ) -> Result<Transaction, WalletError> {
        require_admin(caller, "adjust balances")?;
        let new = NewTransaction::new(user_id.clone(), TransactionType::Adjustment, amount)
            .with_metadata(serde_json::json!({
                "reason": reason,
                "adjustedBy": caller.user_id,
            }));
        let (tx, _) = self.repo.record_completed(&new, &self.currency).await?;
        info!(user_id = %user_id, amount = %amount, admin = %caller.user_id, "Balance adjusted");
        Ok(tx)
    }

    /// Join an upcoming league, paying the entry fee from the caller's wallet.
    pub async fn join_league(
        &self,
        caller: &Caller,
        league_id: LeagueId,
        team_id: TeamId,
        points_at_join: i64,
    ) -> Result<Entry, WalletError> {
        Ok(self
            .repo
            .join_league(league_id, &caller.user_id, team_id, points_at_join, &self.currency)
            .await?)
    }

    async fn gateway_transition(
        &self,
        caller: &Caller,
        tx_id: &str,
        tx_type: TransactionType,
        target: TransactionStatus,
        note: Option<&str>,
    ) -> Result<TransitionOutcome, WalletError> {
        require_admin(caller, "settle gateway transactions")?;
        self.expect_type(tx_id, tx_type).await?;
        Ok(self.repo.transition_transaction(tx_id, target, note).await?)
    }

    async fn expect_type(&self, tx_id: &str, tx_type: TransactionType) -> Result<(), WalletError> {
        let tx = self
            .repo
            .get_transaction(tx_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("transaction {}", tx_id)))?;
        if tx.tx_type != tx_type {
            return Err(StoreError::Rejected(format!(
                "transaction {} is a {}, not a {}",
                tx_id, tx.tx_type, tx_type
            ))
            .into());
        }
        Ok(())
    }
}

fn require_admin(caller: &Caller, action: &str) -> Result<(), WalletError> {
    if caller.is_admin {
        Ok(())
    } else {
        Err(WalletError::Forbidden(format!("only admins may {}", action)))
    }
}

fn require_owner(caller: &Caller, user_id: &UserId) -> Result<(), WalletError> {
    if caller.can_act_for(user_id) {
        Ok(())
    } else {
        Err(WalletError::Forbidden(format!(
            "{} may not access the wallet of {}",
            caller.user_id, user_id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_and_admin_capabilities() {
        let alice = Caller::user(UserId::new("alice"));
        let ops = Caller::admin(UserId::new("ops"));

        assert!(require_owner(&alice, &UserId::new("alice")).is_ok());
        assert!(matches!(
            require_owner(&alice, &UserId::new("bob")),
            Err(WalletError::Forbidden(_))
        ));
        assert!(require_owner(&ops, &UserId::new("bob")).is_ok());

        assert!(require_admin(&ops, "x").is_ok());
        assert!(matches!(require_admin(&alice, "x"), Err(WalletError::Forbidden(_))));
    }
}
