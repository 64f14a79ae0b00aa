//! League: a pooled contest bound to one scoring period.

use crate::domain::{Decimal, LeagueId, PeriodId, TimeMs};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// League lifecycle status. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeagueStatus {
    Upcoming,
    Active,
    Completed,
}

impl LeagueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeagueStatus::Upcoming => "upcoming",
            LeagueStatus::Active => "active",
            LeagueStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for LeagueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeagueStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upcoming" => Ok(LeagueStatus::Upcoming),
            "active" => Ok(LeagueStatus::Active),
            "completed" => Ok(LeagueStatus::Completed),
            other => Err(format!("unknown league status: {}", other)),
        }
    }
}

/// How many ranks a league pays and what share each gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrizeStructure {
    Tri,
    Duo,
    Jackpot,
}

impl PrizeStructure {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrizeStructure::Tri => "tri",
            PrizeStructure::Duo => "duo",
            PrizeStructure::Jackpot => "jackpot",
        }
    }

    /// `(rank, percentage share)` rows, ordered by rank. Shares sum to 100.
    pub fn shares(&self) -> &'static [(u32, u32)] {
        match self {
            PrizeStructure::Tri => &[(1, 60), (2, 25), (3, 15)],
            PrizeStructure::Duo => &[(1, 70), (2, 30)],
            PrizeStructure::Jackpot => &[(1, 100)],
        }
    }
}

impl FromStr for PrizeStructure {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tri" => Ok(PrizeStructure::Tri),
            "duo" => Ok(PrizeStructure::Duo),
            "jackpot" => Ok(PrizeStructure::Jackpot),
            other => Err(format!("unknown prize structure: {}", other)),
        }
    }
}

/// A persisted league.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct League {
    pub id: LeagueId,
    pub name: String,
    pub period_id: PeriodId,
    pub entry_fee: Decimal,
    pub max_participants: i64,
    pub start_at: TimeMs,
    pub end_at: TimeMs,
    pub prize_structure: PrizeStructure,
    pub platform_fee_pct: Decimal,
    pub status: LeagueStatus,
    /// Informational only; the live "leading" score.
    pub highest_period_points: i64,
    /// Audit digest of the final standings, set at finalization.
    pub settlement_digest: Option<String>,
}

/// Input for league creation (admin action in the shell).
#[derive(Debug, Clone)]
pub struct NewLeague {
    pub name: String,
    pub period_id: PeriodId,
    pub entry_fee: Decimal,
    pub max_participants: i64,
    pub start_at: TimeMs,
    pub end_at: TimeMs,
    pub prize_structure: PrizeStructure,
    pub platform_fee_pct: Decimal,
}
