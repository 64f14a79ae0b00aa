//! Entry: one user's paid slot in one league.

use crate::domain::{Decimal, EntryId, LeagueId, TeamId, TimeMs, UserId};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutStatus {
    None,
    Pending,
    Completed,
}

impl PayoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutStatus::None => "none",
            PayoutStatus::Pending => "pending",
            PayoutStatus::Completed => "completed",
        }
    }
}

impl FromStr for PayoutStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(PayoutStatus::None),
            "pending" => Ok(PayoutStatus::Pending),
            "completed" => Ok(PayoutStatus::Completed),
            other => Err(format!("unknown payout status: {}", other)),
        }
    }
}

/// A persisted entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: EntryId,
    pub league_id: LeagueId,
    pub user_id: UserId,
    pub team_id: TeamId,
    /// Baseline total at join time.
    pub points_at_join: i64,
    /// Live points scored in the league's period.
    pub period_points: i64,
    /// `points_at_join + period_points`, frozen at completion.
    pub final_points: Option<i64>,
    pub rank: Option<i64>,
    pub winnings: Decimal,
    pub payout_status: PayoutStatus,
    pub joined_at: TimeMs,
}

impl Entry {
    /// Total used by the final standings pass.
    pub fn computed_final_points(&self) -> i64 {
        self.points_at_join + self.period_points
    }
}
