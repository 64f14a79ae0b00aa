//! League reconciler: one league's live refresh and, once its period is
//! finalized, its one-time settlement.

use crate::datasource::{ScoringError, ScoringFeed};
use crate::db::{FinalStanding, LiveStanding, Repository, StoreError};
use crate::domain::{Entry, League, LeagueId, LeagueStatus, PayoutStatus, TeamId};
use crate::engine::{
    compute_winnings, prize_pool, rank_league, settlement_digest, Payout, PrizeTable, RankingPass,
    Ranked,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("scoring feed: {0}")]
    Scoring(#[from] ScoringError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("league {0} not found")]
    LeagueNotFound(LeagueId),
    #[error("league {league_id} is {status}: {reason}")]
    InvalidState {
        league_id: LeagueId,
        status: LeagueStatus,
        reason: String,
    },
    #[error("league {league_id} cannot be settled: {reason}")]
    Settlement { league_id: LeagueId, reason: String },
}

impl From<sqlx::Error> for ReconcileError {
    fn from(err: sqlx::Error) -> Self {
        ReconcileError::Store(StoreError::Db(err))
    }
}

/// What one reconciliation of one league did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeagueOutcome {
    pub league_id: LeagueId,
    pub entries_updated: usize,
    pub ranks_updated: usize,
    /// True when this pass settled the league (or re-settled it).
    pub finalized: bool,
    pub winnings_credited: usize,
    pub credits_skipped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settlement_digest: Option<String>,
}

impl LeagueOutcome {
    fn new(league_id: LeagueId) -> Self {
        Self {
            league_id,
            ..Default::default()
        }
    }
}

#[derive(Clone)]
pub struct LeagueReconciler {
    feed: Arc<dyn ScoringFeed>,
    repo: Arc<Repository>,
    currency: String,
}

impl LeagueReconciler {
    pub fn new(feed: Arc<dyn ScoringFeed>, repo: Arc<Repository>, currency: String) -> Self {
        Self {
            feed,
            repo,
            currency,
        }
    }

    /// Refresh an active league and settle it if its period is finalized.
    ///
    /// Safe to call concurrently or repeatedly for the same league. A feed
    /// failure aborts before any write; the league keeps its status.
    pub async fn reconcile(&self, league_id: LeagueId) -> Result<LeagueOutcome, ReconcileError> {
        let league = self.load_league(league_id).await?;
        match league.status {
            LeagueStatus::Active => {}
            // Another run settled it between listing and now.
            LeagueStatus::Completed => return Ok(LeagueOutcome::new(league_id)),
            LeagueStatus::Upcoming => {
                return Err(ReconcileError::InvalidState {
                    league_id,
                    status: league.status,
                    reason: "not yet active".to_string(),
                })
            }
        }

        let entries = self.repo.list_entries(league_id).await?;
        let status = self.feed.period_status(league.period_id).await?;
        let points = self.fetch_points(&league, &entries).await?;
        let merged = merge_period_points(&entries, &points);

        if status.is_complete() {
            info!(
                league_id = %league_id,
                period_id = %league.period_id,
                "Period finalized, settling league"
            );
            self.settle(&league, &entries, merged).await
        } else {
            self.live_pass(&league, &entries, merged).await
        }
    }

    /// Re-run settlement for a completed league without double-crediting.
    ///
    /// Points are refreshed from the feed when it is reachable and reports the
    /// period finalized; otherwise the stored points are used.
    pub async fn refinalize(&self, league_id: LeagueId) -> Result<LeagueOutcome, ReconcileError> {
        let league = self.load_league(league_id).await?;
        if league.status != LeagueStatus::Completed {
            return Err(ReconcileError::InvalidState {
                league_id,
                status: league.status,
                reason: "only completed leagues can be re-finalized".to_string(),
            });
        }

        let entries = self.repo.list_entries(league_id).await?;
        let refreshed = match self.feed.period_status(league.period_id).await {
            Ok(status) if status.is_complete() => self.fetch_points(&league, &entries).await,
            Ok(_) => Ok(HashMap::new()),
            Err(e) => Err(e),
        };
        let points = refreshed.unwrap_or_else(|e| {
            warn!(league_id = %league_id, error = %e, "Feed unavailable, re-finalizing from stored points");
            HashMap::new()
        });

        let merged = merge_period_points(&entries, &points);
        self.settle(&league, &entries, merged).await
    }

    async fn load_league(&self, league_id: LeagueId) -> Result<League, ReconcileError> {
        self.repo
            .get_league(league_id)
            .await?
            .ok_or(ReconcileError::LeagueNotFound(league_id))
    }

    /// One feed read per league, batched across all of its teams.
    async fn fetch_points(
        &self,
        league: &League,
        entries: &[Entry],
    ) -> Result<HashMap<TeamId, i64>, ScoringError> {
        let mut team_ids: Vec<TeamId> = entries.iter().map(|e| e.team_id).collect();
        team_ids.sort_unstable();
        team_ids.dedup();
        if team_ids.is_empty() {
            return Ok(HashMap::new());
        }
        debug!(league_id = %league.id, teams = team_ids.len(), "Fetching league points");
        self.feed.live_points(league.period_id, &team_ids).await
    }

    async fn live_pass(
        &self,
        league: &League,
        previous: &[Entry],
        merged: Vec<Entry>,
    ) -> Result<LeagueOutcome, ReconcileError> {
        let ranked = rank_league(&merged, RankingPass::Live);
        let mut outcome = LeagueOutcome::new(league.id);
        outcome.entries_updated = count_point_changes(previous, &merged);
        outcome.ranks_updated = count_rank_changes(previous, &ranked);

        let highest = highest_period_points(&merged);
        if outcome.entries_updated == 0
            && outcome.ranks_updated == 0
            && highest == league.highest_period_points
        {
            return Ok(outcome);
        }

        let by_id: HashMap<_, _> = merged.iter().map(|e| (e.id, e.period_points)).collect();
        let standings: Vec<LiveStanding> = ranked
            .iter()
            .map(|r| LiveStanding {
                entry_id: r.entry_id,
                period_points: by_id.get(&r.entry_id).copied().unwrap_or(r.points),
                rank: r.rank,
            })
            .collect();

        if !self
            .repo
            .apply_live_pass(league.id, &standings, highest)
            .await?
        {
            debug!(league_id = %league.id, "League left active state mid-pass, discarding live update");
            return Ok(LeagueOutcome::new(league.id));
        }

        debug!(
            league_id = %league.id,
            entries_updated = outcome.entries_updated,
            ranks_updated = outcome.ranks_updated,
            "Live pass applied"
        );
        Ok(outcome)
    }

    /// Freeze final points, rank, compute and write winnings, credit winners,
    /// then complete the league. Every step is safe to re-run.
    async fn settle(
        &self,
        league: &League,
        previous: &[Entry],
        merged: Vec<Entry>,
    ) -> Result<LeagueOutcome, ReconcileError> {
        let frozen: Vec<Entry> = merged
            .into_iter()
            .map(|mut e| {
                e.final_points = Some(e.computed_final_points());
                e
            })
            .collect();

        let ranked = rank_league(&frozen, RankingPass::Final);
        let pool = prize_pool(
            league.entry_fee,
            frozen.len() as i64,
            league.platform_fee_pct,
        )
        .ok_or_else(|| ReconcileError::Settlement {
            league_id: league.id,
            reason: "prize pool out of range".to_string(),
        })?;
        let table = PrizeTable::for_structure(league.prize_structure).map_err(|e| {
            ReconcileError::Settlement {
                league_id: league.id,
                reason: e.to_string(),
            }
        })?;

        // Credited amounts are final: the entry keeps what its wallet received.
        let credited = self.repo.credited_winnings(league.id).await?;
        let payouts: Vec<Payout> = compute_winnings(&ranked, &table, pool)
            .into_iter()
            .map(|mut p| {
                if let Some(&amount) = credited.get(&p.entry_id) {
                    if amount != p.winnings {
                        warn!(
                            league_id = %league.id,
                            entry_id = %p.entry_id,
                            credited = %amount,
                            computed = %p.winnings,
                            "Recomputed winnings differ from the credited amount, keeping the credit"
                        );
                    }
                    p.winnings = amount;
                }
                p
            })
            .collect();
        let digest = settlement_digest(&payouts);

        let by_id: HashMap<_, _> = frozen.iter().map(|e| (e.id, e)).collect();
        let standings: Vec<FinalStanding> = payouts
            .iter()
            .filter_map(|p| {
                let entry = by_id.get(&p.entry_id)?;
                Some(FinalStanding {
                    entry_id: p.entry_id,
                    period_points: entry.period_points,
                    final_points: entry.computed_final_points(),
                    rank: p.rank,
                    winnings: p.winnings,
                    payout_status: settled_payout_status(entry.payout_status, p.winnings.is_positive()),
                })
            })
            .collect();

        let mut outcome = LeagueOutcome::new(league.id);
        outcome.entries_updated = count_point_changes(previous, &frozen);
        outcome.ranks_updated = count_rank_changes(previous, &ranked);

        let highest = highest_period_points(&frozen);
        if !self
            .repo
            .apply_final_standings(league.id, &standings, highest, &digest)
            .await?
        {
            return Err(ReconcileError::InvalidState {
                league_id: league.id,
                status: league.status,
                reason: "league cannot be settled from its current state".to_string(),
            });
        }

        for payout in payouts.iter().filter(|p| p.winnings.is_positive()) {
            if credited.contains_key(&payout.entry_id) {
                outcome.credits_skipped += 1;
                continue;
            }
            let Some(entry) = by_id.get(&payout.entry_id) else {
                continue;
            };
            if self
                .repo
                .credit_winnings(entry, payout.winnings, &self.currency)
                .await?
            {
                outcome.winnings_credited += 1;
            } else {
                outcome.credits_skipped += 1;
            }
        }

        if self.repo.complete_league(league.id).await? {
            info!(
                league_id = %league.id,
                pool = %pool,
                credited = outcome.winnings_credited,
                digest = %digest,
                "League completed"
            );
        } else if outcome.credits_skipped > 0 {
            info!(
                league_id = %league.id,
                skipped = outcome.credits_skipped,
                "Re-finalized league, existing credits left untouched"
            );
        }

        outcome.finalized = true;
        outcome.settlement_digest = Some(digest);
        Ok(outcome)
    }
}

/// New period points: the larger of the feed value and the last known value.
/// Teams missing from the feed keep their last known points.
fn merge_period_points(entries: &[Entry], points: &HashMap<TeamId, i64>) -> Vec<Entry> {
    entries
        .iter()
        .cloned()
        .map(|mut e| {
            if let Some(&fresh) = points.get(&e.team_id) {
                e.period_points = e.period_points.max(fresh);
            }
            e
        })
        .collect()
}

fn highest_period_points(entries: &[Entry]) -> i64 {
    entries.iter().map(|e| e.period_points).max().unwrap_or(0)
}

fn count_point_changes(previous: &[Entry], current: &[Entry]) -> usize {
    let before: HashMap<_, _> = previous.iter().map(|e| (e.id, e.period_points)).collect();
    current
        .iter()
        .filter(|e| before.get(&e.id) != Some(&e.period_points))
        .count()
}

fn count_rank_changes(previous: &[Entry], ranked: &[Ranked]) -> usize {
    let before: HashMap<_, _> = previous.iter().map(|e| (e.id, e.rank)).collect();
    ranked
        .iter()
        .filter(|r| before.get(&r.entry_id).copied().flatten() != Some(r.rank))
        .count()
}

/// A completed payout stays completed; otherwise winners wait for their credit.
fn settled_payout_status(current: PayoutStatus, has_winnings: bool) -> PayoutStatus {
    match (current, has_winnings) {
        (PayoutStatus::Completed, _) => PayoutStatus::Completed,
        (_, true) => PayoutStatus::Pending,
        (_, false) => PayoutStatus::None,
    }
}
