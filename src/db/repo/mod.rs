//! Repository layer for database operations.
//!
//! This module provides the `Repository` struct for all database operations.
//! Methods are organized across submodules by domain:
//! - `leagues.rs` - League lifecycle, entries and per-league settlement batches
//! - `ledger.rs` - Wallets, transactions and atomic balance transitions
//!
//! Nothing outside `ledger.rs` writes a wallet balance.

mod leagues;
mod ledger;

pub use leagues::{FinalStanding, LiveStanding};
pub use ledger::{entry_fee_reference, winnings_reference, TransactionFilter, TransitionOutcome};

use crate::domain::{
    Decimal, Entry, EntryId, League, LeagueId, PeriodId, TeamId, TimeMs, Transaction, UserId,
    Wallet, WalletId,
};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use thiserror::Error;

/// Errors from store operations that enforce ledger or league invariants.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance {
        available: Decimal,
        requested: Decimal,
    },
    #[error(transparent)]
    IllegalTransition(#[from] crate::domain::IllegalTransition),
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("concurrent update lost: {0}")]
    Conflict(String),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// Repository for database operations.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    /// Cheap round trip used by the readiness probe.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn now_ms() -> i64 {
    TimeMs::now().as_ms()
}

fn decode_err(msg: String) -> sqlx::Error {
    sqlx::Error::Decode(msg.into())
}

fn get_decimal(row: &SqliteRow, column: &str) -> Result<Decimal, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    Decimal::from_str(&raw).map_err(|e| decode_err(format!("{}={:?}: {}", column, raw, e)))
}

fn get_parsed<T>(row: &SqliteRow, column: &str) -> Result<T, sqlx::Error>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.try_get(column)?;
    T::from_str(&raw).map_err(decode_err)
}

fn league_from_row(row: &SqliteRow) -> Result<League, sqlx::Error> {
    Ok(League {
        id: LeagueId::new(row.try_get("id")?),
        name: row.try_get("name")?,
        period_id: PeriodId::new(row.try_get("period_id")?),
        entry_fee: get_decimal(row, "entry_fee")?,
        max_participants: row.try_get("max_participants")?,
        start_at: TimeMs::new(row.try_get("start_at")?),
        end_at: TimeMs::new(row.try_get("end_at")?),
        prize_structure: get_parsed(row, "prize_structure")?,
        platform_fee_pct: get_decimal(row, "platform_fee_pct")?,
        status: get_parsed(row, "status")?,
        highest_period_points: row.try_get("highest_period_points")?,
        settlement_digest: row.try_get("settlement_digest")?,
    })
}

fn entry_from_row(row: &SqliteRow) -> Result<Entry, sqlx::Error> {
    Ok(Entry {
        id: EntryId::new(row.try_get("id")?),
        league_id: LeagueId::new(row.try_get("league_id")?),
        user_id: UserId::new(row.try_get::<String, _>("user_id")?),
        team_id: TeamId::new(row.try_get("team_id")?),
        points_at_join: row.try_get("points_at_join")?,
        period_points: row.try_get("period_points")?,
        final_points: row.try_get("final_points")?,
        rank: row.try_get("rank")?,
        winnings: get_decimal(row, "winnings")?,
        payout_status: get_parsed(row, "payout_status")?,
        joined_at: TimeMs::new(row.try_get("joined_at")?),
    })
}

fn wallet_from_row(row: &SqliteRow) -> Result<Wallet, sqlx::Error> {
    Ok(Wallet {
        id: WalletId::new(row.try_get("id")?),
        user_id: UserId::new(row.try_get::<String, _>("user_id")?),
        balance: get_decimal(row, "balance")?,
        currency: row.try_get("currency")?,
        version: row.try_get("version")?,
    })
}

fn transaction_from_row(row: &SqliteRow) -> Result<Transaction, sqlx::Error> {
    let metadata = row
        .try_get::<Option<String>, _>("metadata")?
        .map(|raw| serde_json::from_str(&raw))
        .transpose()
        .map_err(|e| decode_err(format!("metadata: {}", e)))?;

    Ok(Transaction {
        id: row.try_get("id")?,
        wallet_id: WalletId::new(row.try_get("wallet_id")?),
        user_id: UserId::new(row.try_get::<String, _>("user_id")?),
        tx_type: get_parsed(row, "tx_type")?,
        status: get_parsed(row, "status")?,
        amount: get_decimal(row, "amount")?,
        currency: row.try_get("currency")?,
        external_reference: row.try_get("external_reference")?,
        metadata,
        note: row.try_get("note")?,
        created_at: TimeMs::new(row.try_get("created_at")?),
        updated_at: TimeMs::new(row.try_get("updated_at")?),
    })
}
