//! Ledger store: wallets, transactions and atomic balance transitions.
//!
//! Every balance change is committed in the same database transaction as the
//! transaction-status change that realizes it. Status changes are guarded by a
//! compare-and-swap on the current status and balance writes by a
//! compare-and-swap on the wallet version.

use super::{get_decimal, now_ms, transaction_from_row, wallet_from_row, Repository, StoreError};
use crate::domain::{
    plan_transition, BalanceEffect, Decimal, Direction, EffectRefused, Entry, EntryId, LeagueId,
    NewTransaction, TimeMs, Transaction, TransactionStatus, TransactionType, TransitionPlan, UserId,
    Wallet, WalletId, MAX_AMOUNT_UNITS,
};
use sqlx::sqlite::{Sqlite, SqliteConnection};
use sqlx::{QueryBuilder, Row};
use std::collections::HashMap;
use tracing::{info, warn};
use uuid::Uuid;

/// Attempts at the status compare-and-swap before giving up.
const MAX_CAS_ATTEMPTS: usize = 5;

const TRANSACTION_COLUMNS: &str = "id, wallet_id, user_id, tx_type, status, amount, currency, \
     external_reference, metadata, note, created_at, updated_at";

/// Result of a transition request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// Target status reached; the balance effect was applied exactly once.
    Applied(Transaction),
    /// Already in the target status or settled. Nothing changed.
    Unchanged(Transaction),
    /// A guarded debit could not be covered; the transaction moved to `FAILED`.
    Declined {
        transaction: Transaction,
        reason: String,
    },
}

impl TransitionOutcome {
    pub fn transaction(&self) -> &Transaction {
        match self {
            TransitionOutcome::Applied(t) | TransitionOutcome::Unchanged(t) => t,
            TransitionOutcome::Declined { transaction, .. } => transaction,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied(_))
    }
}

/// Query surface for transaction listings.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub user_id: Option<UserId>,
    pub status: Option<TransactionStatus>,
    pub tx_type: Option<TransactionType>,
    pub from_ms: Option<TimeMs>,
    pub to_ms: Option<TimeMs>,
    pub limit: Option<i64>,
}

/// Idempotency key for a league entry's prize credit.
pub fn winnings_reference(league_id: LeagueId, entry_id: EntryId) -> String {
    format!("winnings:{}:{}", league_id, entry_id)
}

/// Idempotency key for a user's entry fee in a league.
pub fn entry_fee_reference(league_id: LeagueId, user_id: &UserId) -> String {
    format!("entry-fee:{}:{}", league_id, user_id)
}

pub(super) fn validate_amount(amount: Decimal) -> Result<(), StoreError> {
    if !amount.is_positive() {
        return Err(StoreError::Rejected(format!(
            "amount must be positive, got {}",
            amount
        )));
    }
    if !amount.is_minor_precise() {
        return Err(StoreError::Rejected(format!(
            "amount {} has more than two decimal places",
            amount
        )));
    }
    if amount > Decimal::from_i64(MAX_AMOUNT_UNITS) {
        return Err(StoreError::Rejected(format!(
            "amount {} exceeds the limit of {}",
            amount, MAX_AMOUNT_UNITS
        )));
    }
    Ok(())
}

fn balance_overflow(wallet: &Wallet, amount: Decimal) -> StoreError {
    StoreError::Rejected(format!(
        "crediting {} would overflow the balance of wallet {}",
        amount, wallet.id
    ))
}

/// Create the wallet lazily. As the first statement of a database transaction
/// this also takes the write lock.
pub(super) async fn ensure_wallet_in(
    conn: &mut SqliteConnection,
    user_id: &UserId,
    currency: &str,
) -> Result<Wallet, sqlx::Error> {
    let now = now_ms();
    sqlx::query(
        r#"
        INSERT INTO wallets (user_id, balance, currency, version, created_at, updated_at)
        VALUES (?, '0', ?, 0, ?, ?)
        ON CONFLICT(user_id) DO NOTHING
        "#,
    )
    .bind(user_id.as_str())
    .bind(currency)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    let row = sqlx::query(
        "SELECT id, user_id, balance, currency, version FROM wallets WHERE user_id = ?",
    )
    .bind(user_id.as_str())
    .fetch_one(&mut *conn)
    .await?;
    wallet_from_row(&row)
}

async fn wallet_by_id_in(
    conn: &mut SqliteConnection,
    wallet_id: WalletId,
) -> Result<Option<Wallet>, sqlx::Error> {
    let row = sqlx::query("SELECT id, user_id, balance, currency, version FROM wallets WHERE id = ?")
        .bind(wallet_id.as_i64())
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(wallet_from_row).transpose()
}

/// Write a new balance, guarded by the wallet version read earlier in the same
/// database transaction.
pub(super) async fn set_balance(
    conn: &mut SqliteConnection,
    wallet: &Wallet,
    new_balance: Decimal,
) -> Result<(), StoreError> {
    if new_balance.is_negative() {
        return Err(StoreError::InsufficientBalance {
            available: wallet.balance,
            requested: wallet.balance - new_balance,
        });
    }

    let result = sqlx::query(
        r#"
        UPDATE wallets
        SET balance = ?, version = version + 1, updated_at = ?
        WHERE id = ? AND version = ?
        "#,
    )
    .bind(new_balance.to_canonical_string())
    .bind(now_ms())
    .bind(wallet.id.as_i64())
    .bind(wallet.version)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::Conflict(format!(
            "wallet {} changed during update",
            wallet.id
        )));
    }
    Ok(())
}

async fn transaction_by_reference_in(
    conn: &mut SqliteConnection,
    reference: &str,
) -> Result<Option<Transaction>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM transactions WHERE external_reference = ?",
        TRANSACTION_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(reference)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(transaction_from_row).transpose()
}

async fn transaction_by_id_in(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<Transaction>, sqlx::Error> {
    let sql = format!("SELECT {} FROM transactions WHERE id = ?", TRANSACTION_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(transaction_from_row).transpose()
}

/// Append a transaction row. `Ok(None)` when the external reference is already taken.
pub(super) async fn insert_transaction_in(
    conn: &mut SqliteConnection,
    wallet: &Wallet,
    new: &NewTransaction,
    status: TransactionStatus,
) -> Result<Option<Transaction>, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = now_ms();
    let metadata = new.metadata.as_ref().map(|m| m.to_string());

    let result = sqlx::query(
        r#"
        INSERT INTO transactions (
            id, wallet_id, user_id, tx_type, status, amount, currency,
            external_reference, metadata, note, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?)
        ON CONFLICT(external_reference) DO NOTHING
        "#,
    )
    .bind(&id)
    .bind(wallet.id.as_i64())
    .bind(new.user_id.as_str())
    .bind(new.tx_type.as_str())
    .bind(status.as_str())
    .bind(new.amount.to_canonical_string())
    .bind(&wallet.currency)
    .bind(new.external_reference.as_deref())
    .bind(metadata)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }
    transaction_by_id_in(conn, &id).await
}

/// A reused external reference must describe the same transaction.
fn ensure_same_request(existing: &Transaction, new: &NewTransaction) -> Result<(), StoreError> {
    if existing.tx_type != new.tx_type
        || existing.amount != new.amount
        || existing.user_id != new.user_id
    {
        return Err(StoreError::Rejected(format!(
            "external reference {} already belongs to a different transaction",
            existing.external_reference.as_deref().unwrap_or_default()
        )));
    }
    Ok(())
}

impl Repository {
    // =========================================================================
    // Wallet reads
    // =========================================================================

    /// Get a user's wallet, creating it on first use.
    pub async fn ensure_wallet(&self, user_id: &UserId, currency: &str) -> Result<Wallet, StoreError> {
        let mut tx = self.pool.begin().await?;
        let wallet = ensure_wallet_in(&mut tx, user_id, currency).await?;
        tx.commit().await?;
        Ok(wallet)
    }

    pub async fn get_wallet(&self, user_id: &UserId) -> Result<Option<Wallet>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT id, user_id, balance, currency, version FROM wallets WHERE user_id = ?",
        )
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(wallet_from_row).transpose()
    }

    // =========================================================================
    // Transaction reads
    // =========================================================================

    pub async fn get_transaction(&self, id: &str) -> Result<Option<Transaction>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        transaction_by_id_in(&mut conn, id).await
    }

    /// Amounts already credited as winnings in a league, keyed by entry.
    pub async fn credited_winnings(
        &self,
        league_id: LeagueId,
    ) -> Result<HashMap<EntryId, Decimal>, sqlx::Error> {
        let prefix = format!("winnings:{}:", league_id);
        let rows = sqlx::query(
            "SELECT external_reference, amount FROM transactions \
             WHERE tx_type = ? AND external_reference LIKE ?",
        )
        .bind(TransactionType::Winnings.as_str())
        .bind(format!("{}%", prefix))
        .fetch_all(&self.pool)
        .await?;

        let mut credited = HashMap::with_capacity(rows.len());
        for row in &rows {
            let reference: String = row.try_get("external_reference")?;
            let Some(entry_id) = reference
                .strip_prefix(&prefix)
                .and_then(|id| id.parse::<i64>().ok())
            else {
                continue;
            };
            credited.insert(EntryId::new(entry_id), get_decimal(row, "amount")?);
        }
        Ok(credited)
    }

    /// List transactions, newest first.
    pub async fn list_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>, sqlx::Error> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {} FROM transactions WHERE 1 = 1",
            TRANSACTION_COLUMNS
        ));
        if let Some(user_id) = &filter.user_id {
            qb.push(" AND user_id = ").push_bind(user_id.as_str().to_string());
        }
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(tx_type) = filter.tx_type {
            qb.push(" AND tx_type = ").push_bind(tx_type.as_str());
        }
        if let Some(from_ms) = filter.from_ms {
            qb.push(" AND created_at >= ").push_bind(from_ms.as_ms());
        }
        if let Some(to_ms) = filter.to_ms {
            qb.push(" AND created_at <= ").push_bind(to_ms.as_ms());
        }
        qb.push(" ORDER BY created_at DESC, id ASC LIMIT ")
            .push_bind(filter.limit.unwrap_or(100).clamp(1, 1000));

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(transaction_from_row).collect()
    }

    // =========================================================================
    // Ledger writes
    // =========================================================================

    /// Append a transaction in its initial status (`PENDING`, or
    /// `REQUIRES_APPROVAL` for withdrawals). No balance effect.
    ///
    /// Idempotent on `external_reference`: a repeat returns the original row.
    pub async fn create_transaction(
        &self,
        new: &NewTransaction,
        currency: &str,
    ) -> Result<Transaction, StoreError> {
        validate_amount(new.amount)?;

        let mut tx = self.pool.begin().await?;
        let wallet = ensure_wallet_in(&mut tx, &new.user_id, currency).await?;

        if let Some(reference) = new.external_reference.as_deref() {
            if let Some(existing) = transaction_by_reference_in(&mut tx, reference).await? {
                ensure_same_request(&existing, new)?;
                tx.commit().await?;
                return Ok(existing);
            }
        }

        let created = insert_transaction_in(&mut tx, &wallet, new, new.initial_status())
            .await?
            .ok_or_else(|| StoreError::Conflict("external reference taken".to_string()))?;
        tx.commit().await?;

        info!(
            tx_id = %created.id,
            tx_type = %created.tx_type,
            status = %created.status,
            amount = %created.amount,
            "Transaction created"
        );
        Ok(created)
    }

    /// Append an already-`COMPLETED` transaction and apply its balance effect atomically.
    ///
    /// Returns the transaction and whether it was newly created. A repeat with the
    /// same `external_reference` returns the original and changes nothing.
    pub async fn record_completed(
        &self,
        new: &NewTransaction,
        currency: &str,
    ) -> Result<(Transaction, bool), StoreError> {
        validate_amount(new.amount)?;

        let mut tx = self.pool.begin().await?;
        let wallet = ensure_wallet_in(&mut tx, &new.user_id, currency).await?;

        if let Some(reference) = new.external_reference.as_deref() {
            if let Some(existing) = transaction_by_reference_in(&mut tx, reference).await? {
                ensure_same_request(&existing, new)?;
                tx.commit().await?;
                return Ok((existing, false));
            }
        }

        let effect = match new.tx_type.direction() {
            Direction::Credit => BalanceEffect::Credit,
            Direction::Debit => BalanceEffect::Debit,
        };
        let new_balance = effect
            .apply(wallet.balance, new.amount)
            .map_err(|refused| match refused {
                EffectRefused::InsufficientBalance => StoreError::InsufficientBalance {
                    available: wallet.balance,
                    requested: new.amount,
                },
                EffectRefused::Overflow => balance_overflow(&wallet, new.amount),
            })?;

        let created = insert_transaction_in(&mut tx, &wallet, new, TransactionStatus::Completed)
            .await?
            .ok_or_else(|| StoreError::Conflict("external reference taken".to_string()))?;
        set_balance(&mut tx, &wallet, new_balance).await?;
        tx.commit().await?;

        info!(
            tx_id = %created.id,
            tx_type = %created.tx_type,
            amount = %created.amount,
            balance = %new_balance,
            "Completed transaction recorded"
        );
        Ok((created, true))
    }

    /// Move a transaction to `target`, applying its balance effect exactly once.
    ///
    /// Re-invoking on a transaction already in `target`, or already settled,
    /// returns `Unchanged`. Illegal transitions are rejected without any write.
    pub async fn transition_transaction(
        &self,
        id: &str,
        target: TransactionStatus,
        note: Option<&str>,
    ) -> Result<TransitionOutcome, StoreError> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let current = self
                .get_transaction(id)
                .await?
                .ok_or_else(|| StoreError::NotFound(format!("transaction {}", id)))?;

            let effect = match plan_transition(current.tx_type, current.status, target)? {
                TransitionPlan::Unchanged(_) => return Ok(TransitionOutcome::Unchanged(current)),
                TransitionPlan::Apply(effect) => effect,
            };

            let mut tx = self.pool.begin().await?;
            let swapped = sqlx::query(
                r#"
                UPDATE transactions
                SET status = ?, note = COALESCE(?, note), updated_at = ?
                WHERE id = ? AND status = ?
                "#,
            )
            .bind(target.as_str())
            .bind(note)
            .bind(now_ms())
            .bind(id)
            .bind(current.status.as_str())
            .execute(&mut *tx)
            .await?;

            if swapped.rows_affected() == 0 {
                // Someone else moved it first; re-plan from the new status.
                continue;
            }

            let mut declined = None;
            if effect != BalanceEffect::None {
                let wallet = wallet_by_id_in(&mut tx, current.wallet_id)
                    .await?
                    .ok_or_else(|| StoreError::NotFound(format!("wallet {}", current.wallet_id)))?;

                match effect.apply(wallet.balance, current.amount) {
                    Ok(new_balance) => set_balance(&mut tx, &wallet, new_balance).await?,
                    // Dropping `tx` rolls the status swap back.
                    Err(EffectRefused::Overflow) => {
                        return Err(balance_overflow(&wallet, current.amount))
                    }
                    Err(EffectRefused::InsufficientBalance) => {
                        let reason = format!(
                            "insufficient balance: available {}, requested {}",
                            wallet.balance, current.amount
                        );
                        sqlx::query(
                            "UPDATE transactions SET status = ?, note = ?, updated_at = ? WHERE id = ?",
                        )
                        .bind(TransactionStatus::Failed.as_str())
                        .bind(&reason)
                        .bind(now_ms())
                        .bind(id)
                        .execute(&mut *tx)
                        .await?;
                        declined = Some(reason);
                    }
                }
            }

            let updated = transaction_by_id_in(&mut tx, id)
                .await?
                .ok_or_else(|| StoreError::NotFound(format!("transaction {}", id)))?;
            tx.commit().await?;

            return Ok(match declined {
                Some(reason) => {
                    warn!(tx_id = %id, reason = %reason, "Transition declined");
                    TransitionOutcome::Declined {
                        transaction: updated,
                        reason,
                    }
                }
                None => {
                    info!(
                        tx_id = %id,
                        from = %current.status,
                        to = %updated.status,
                        "Transaction transitioned"
                    );
                    TransitionOutcome::Applied(updated)
                }
            });
        }

        Err(StoreError::Conflict(format!(
            "transaction {} kept changing underneath transition to {}",
            id, target
        )))
    }

    /// Credit an entry's winnings and mark its payout completed, atomically.
    ///
    /// Returns `false` without crediting when a `WINNINGS` transaction for the
    /// entry already exists; the payout status is still repaired.
    pub async fn credit_winnings(
        &self,
        entry: &Entry,
        amount: Decimal,
        currency: &str,
    ) -> Result<bool, StoreError> {
        validate_amount(amount)?;
        let reference = winnings_reference(entry.league_id, entry.id);

        let mut tx = self.pool.begin().await?;
        let wallet = ensure_wallet_in(&mut tx, &entry.user_id, currency).await?;

        let created = match transaction_by_reference_in(&mut tx, &reference).await? {
            Some(existing) => {
                if existing.amount != amount {
                    warn!(
                        entry_id = %entry.id,
                        credited = %existing.amount,
                        computed = %amount,
                        "Winnings already credited with a different amount, not re-crediting"
                    );
                }
                false
            }
            None => {
                let new = NewTransaction::new(entry.user_id.clone(), TransactionType::Winnings, amount)
                    .with_reference(reference.clone())
                    .with_metadata(serde_json::json!({
                        "leagueId": entry.league_id,
                        "entryId": entry.id,
                    }));
                insert_transaction_in(&mut tx, &wallet, &new, TransactionStatus::Completed)
                    .await?
                    .ok_or_else(|| StoreError::Conflict(reference.clone()))?;
                let new_balance = wallet
                    .balance
                    .checked_add(amount)
                    .ok_or_else(|| balance_overflow(&wallet, amount))?;
                set_balance(&mut tx, &wallet, new_balance).await?;
                true
            }
        };

        sqlx::query("UPDATE entries SET payout_status = 'completed' WHERE id = ?")
            .bind(entry.id.as_i64())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(created)
    }
}
