//! League lifecycle, entries and per-league settlement batches.

use super::ledger::{
    ensure_wallet_in, entry_fee_reference, insert_transaction_in, set_balance,
};
use super::{entry_from_row, league_from_row, now_ms, Repository, StoreError};
use crate::domain::{
    Decimal, Entry, EntryId, League, LeagueId, LeagueStatus, NewLeague, NewTransaction,
    PayoutStatus, TeamId, TimeMs, TransactionStatus, TransactionType, UserId, MAX_AMOUNT_UNITS,
};
use crate::engine::PrizeTable;
use sqlx::Row;
use tracing::info;

const LEAGUE_COLUMNS: &str = "id, name, period_id, entry_fee, max_participants, start_at, end_at, \
     prize_structure, platform_fee_pct, status, highest_period_points, settlement_digest";

const ENTRY_COLUMNS: &str = "id, league_id, user_id, team_id, points_at_join, period_points, \
     final_points, rank, winnings, payout_status, joined_at";

/// One entry's live leaderboard row for a reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveStanding {
    pub entry_id: EntryId,
    pub period_points: i64,
    pub rank: i64,
}

/// One entry's frozen result at finalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalStanding {
    pub entry_id: EntryId,
    pub period_points: i64,
    pub final_points: i64,
    pub rank: i64,
    pub winnings: Decimal,
    pub payout_status: PayoutStatus,
}

fn validate_new_league(league: &NewLeague) -> Result<(), StoreError> {
    let reject = |msg: &str| Err(StoreError::Rejected(msg.to_string()));

    if league.name.trim().is_empty() {
        return reject("league name is required");
    }
    if league.entry_fee.is_negative() || !league.entry_fee.is_minor_precise() {
        return reject("entry fee must be a non-negative amount with at most two decimals");
    }
    if league.entry_fee > Decimal::from_i64(MAX_AMOUNT_UNITS) {
        return reject("entry fee exceeds the ledger amount limit");
    }
    if league.max_participants < 1 {
        return reject("max participants must be at least 1");
    }
    if league.start_at >= league.end_at {
        return reject("league must start before it ends");
    }
    if league.platform_fee_pct.is_negative() || league.platform_fee_pct > Decimal::hundred() {
        return reject("platform fee must be between 0 and 100 percent");
    }
    PrizeTable::for_structure(league.prize_structure)
        .map_err(|e| StoreError::Rejected(format!("invalid prize table: {}", e)))?;
    Ok(())
}

impl Repository {
    // =========================================================================
    // Leagues
    // =========================================================================

    /// Create a league in `upcoming` status.
    pub async fn insert_league(&self, league: &NewLeague) -> Result<League, StoreError> {
        validate_new_league(league)?;
        let now = now_ms();

        let result = sqlx::query(
            r#"
            INSERT INTO leagues (
                name, period_id, entry_fee, max_participants, start_at, end_at,
                prize_structure, platform_fee_pct, status, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'upcoming', ?, ?)
            "#,
        )
        .bind(league.name.trim())
        .bind(league.period_id.as_i64())
        .bind(league.entry_fee.to_canonical_string())
        .bind(league.max_participants)
        .bind(league.start_at.as_ms())
        .bind(league.end_at.as_ms())
        .bind(league.prize_structure.as_str())
        .bind(league.platform_fee_pct.to_canonical_string())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let id = LeagueId::new(result.last_insert_rowid());
        self.get_league(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("league {}", id)))
    }

    pub async fn get_league(&self, id: LeagueId) -> Result<Option<League>, sqlx::Error> {
        let sql = format!("SELECT {} FROM leagues WHERE id = ?", LEAGUE_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(league_from_row).transpose()
    }

    pub async fn list_leagues_by_status(
        &self,
        status: LeagueStatus,
    ) -> Result<Vec<League>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM leagues WHERE status = ? ORDER BY id ASC",
            LEAGUE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(league_from_row).collect()
    }

    /// Upcoming leagues whose start time has passed.
    pub async fn list_leagues_due_for_activation(
        &self,
        now: TimeMs,
    ) -> Result<Vec<League>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM leagues WHERE status = 'upcoming' AND start_at <= ? ORDER BY start_at ASC, id ASC",
            LEAGUE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(now.as_ms())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(league_from_row).collect()
    }

    /// `upcoming -> active`. Returns false if another run got there first.
    pub async fn activate_league(&self, id: LeagueId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE leagues SET status = 'active', updated_at = ? WHERE id = ? AND status = 'upcoming'",
        )
        .bind(now_ms())
        .bind(id.as_i64())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// `active -> completed`. Returns false if the league was not active.
    pub async fn complete_league(&self, id: LeagueId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE leagues SET status = 'completed', updated_at = ? WHERE id = ? AND status = 'active'",
        )
        .bind(now_ms())
        .bind(id.as_i64())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Entries
    // =========================================================================

    pub async fn list_entries(&self, league_id: LeagueId) -> Result<Vec<Entry>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM entries WHERE league_id = ? ORDER BY id ASC",
            ENTRY_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(league_id.as_i64())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(entry_from_row).collect()
    }

    /// Join a league: insert the entry and capture the entry fee in one database transaction.
    ///
    /// Rejected if the league is not `upcoming`, is full, the user already
    /// joined, or the wallet cannot cover the fee.
    pub async fn join_league(
        &self,
        league_id: LeagueId,
        user_id: &UserId,
        team_id: TeamId,
        points_at_join: i64,
        currency: &str,
    ) -> Result<Entry, StoreError> {
        let mut tx = self.pool.begin().await?;
        let wallet = ensure_wallet_in(&mut tx, user_id, currency).await?;

        let sql = format!("SELECT {} FROM leagues WHERE id = ?", LEAGUE_COLUMNS);
        let league = sqlx::query(&sql)
            .bind(league_id.as_i64())
            .fetch_optional(&mut *tx)
            .await?
            .as_ref()
            .map(league_from_row)
            .transpose()?
            .ok_or_else(|| StoreError::NotFound(format!("league {}", league_id)))?;

        if league.status != LeagueStatus::Upcoming {
            return Err(StoreError::Rejected(format!(
                "league {} is {} and no longer accepts entries",
                league_id, league.status
            )));
        }

        let row = sqlx::query(
            "SELECT COUNT(*) AS total, SUM(CASE WHEN user_id = ? THEN 1 ELSE 0 END) AS mine FROM entries WHERE league_id = ?",
        )
        .bind(user_id.as_str())
        .bind(league_id.as_i64())
        .fetch_one(&mut *tx)
        .await?;
        let total: i64 = row.try_get("total")?;
        let mine: Option<i64> = row.try_get("mine")?;

        if mine.unwrap_or(0) > 0 {
            return Err(StoreError::Rejected(format!(
                "user {} already joined league {}",
                user_id, league_id
            )));
        }
        if total >= league.max_participants {
            return Err(StoreError::Rejected(format!("league {} is full", league_id)));
        }

        if league.entry_fee.is_positive() {
            let fee = NewTransaction::new(user_id.clone(), TransactionType::EntryFee, league.entry_fee)
                .with_reference(entry_fee_reference(league_id, user_id))
                .with_metadata(serde_json::json!({ "leagueId": league_id }));
            let new_balance = wallet.balance - league.entry_fee;
            if new_balance.is_negative() {
                return Err(StoreError::InsufficientBalance {
                    available: wallet.balance,
                    requested: league.entry_fee,
                });
            }
            insert_transaction_in(&mut tx, &wallet, &fee, TransactionStatus::Completed)
                .await?
                .ok_or_else(|| StoreError::Conflict("entry fee already captured".to_string()))?;
            set_balance(&mut tx, &wallet, new_balance).await?;
        }

        let result = sqlx::query(
            r#"
            INSERT INTO entries (league_id, user_id, team_id, points_at_join, joined_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(league_id.as_i64())
        .bind(user_id.as_str())
        .bind(team_id.as_i64())
        .bind(points_at_join)
        .bind(now_ms())
        .execute(&mut *tx)
        .await?;
        let entry_id = EntryId::new(result.last_insert_rowid());

        let sql = format!("SELECT {} FROM entries WHERE id = ?", ENTRY_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(entry_id.as_i64())
            .fetch_one(&mut *tx)
            .await?;
        let entry = entry_from_row(&row)?;
        tx.commit().await?;

        info!(league_id = %league_id, user_id = %user_id, entry_id = %entry_id, "Entry joined");
        Ok(entry)
    }

    // =========================================================================
    // Settlement batches
    // =========================================================================

    /// Write one live pass for a league: every entry's period points and rank
    /// plus the league's leading score, in one database transaction.
    ///
    /// Returns false, writing nothing, if the league is no longer `active`.
    pub async fn apply_live_pass(
        &self,
        league_id: LeagueId,
        standings: &[LiveStanding],
        highest_period_points: i64,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE leagues SET highest_period_points = ?, updated_at = ? WHERE id = ? AND status = 'active'",
        )
        .bind(highest_period_points)
        .bind(now_ms())
        .bind(league_id.as_i64())
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Ok(false);
        }

        for s in standings {
            sqlx::query(
                "UPDATE entries SET period_points = ?, rank = ? WHERE id = ? AND league_id = ?",
            )
            .bind(s.period_points)
            .bind(s.rank)
            .bind(s.entry_id.as_i64())
            .bind(league_id.as_i64())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    /// Freeze final standings for a league in one database transaction and
    /// record the settlement digest.
    ///
    /// Allowed while the league is `active` (first finalization) or
    /// `completed` (re-finalization). Returns false, writing nothing, otherwise.
    pub async fn apply_final_standings(
        &self,
        league_id: LeagueId,
        standings: &[FinalStanding],
        highest_period_points: i64,
        digest: &str,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE leagues
            SET highest_period_points = ?, settlement_digest = ?, updated_at = ?
            WHERE id = ? AND status IN ('active', 'completed')
            "#,
        )
        .bind(highest_period_points)
        .bind(digest)
        .bind(now_ms())
        .bind(league_id.as_i64())
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Ok(false);
        }

        for s in standings {
            sqlx::query(
                r#"
                UPDATE entries
                SET period_points = ?, final_points = ?, rank = ?, winnings = ?, payout_status = ?
                WHERE id = ? AND league_id = ?
                "#,
            )
            .bind(s.period_points)
            .bind(s.final_points)
            .bind(s.rank)
            .bind(s.winnings.to_canonical_string())
            .bind(s.payout_status.as_str())
            .bind(s.entry_id.as_i64())
            .bind(league_id.as_i64())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PeriodId, PrizeStructure};

    fn new_league() -> NewLeague {
        NewLeague {
            name: "Sunday Trio".to_string(),
            period_id: PeriodId::new(7),
            entry_fee: Decimal::from_i64(10),
            max_participants: 3,
            start_at: TimeMs::new(1_000),
            end_at: TimeMs::new(2_000),
            prize_structure: PrizeStructure::Tri,
            platform_fee_pct: Decimal::from_i64(10),
        }
    }

    #[test]
    fn validation_accepts_sane_league() {
        assert!(validate_new_league(&new_league()).is_ok());
    }

    #[test]
    fn validation_rejects_bad_fields() {
        let mut l = new_league();
        l.platform_fee_pct = Decimal::from_i64(101);
        assert!(validate_new_league(&l).is_err());

        let mut l = new_league();
        l.end_at = l.start_at;
        assert!(validate_new_league(&l).is_err());

        let mut l = new_league();
        l.entry_fee = Decimal::from_str_canonical("1.005").unwrap();
        assert!(validate_new_league(&l).is_err());

        let mut l = new_league();
        l.max_participants = 0;
        assert!(validate_new_league(&l).is_err());

        let mut l = new_league();
        l.entry_fee = Decimal::from_i64(MAX_AMOUNT_UNITS + 1);
        assert!(validate_new_league(&l).is_err());
    }
}
