//! Standard competition ranking over a full entry set.
//!
//! Ordering is points descending, then earlier `joined_at`, then entry id. Equal
//! points share a rank and the next distinct score resumes at its 1-based
//! position (80, 80, 60 ranks as 1, 1, 3).

use crate::domain::{Entry, EntryId, TimeMs};

/// Which score a ranking pass orders by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankingPass {
    /// In-progress leaderboard: period points only.
    Live,
    /// Final standings: points at join plus period points.
    Final,
}

impl RankingPass {
    pub fn points_for(&self, entry: &Entry) -> i64 {
        match self {
            RankingPass::Live => entry.period_points,
            RankingPass::Final => entry
                .final_points
                .unwrap_or_else(|| entry.computed_final_points()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankInput {
    pub entry_id: EntryId,
    pub points: i64,
    pub joined_at: TimeMs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ranked {
    pub entry_id: EntryId,
    pub points: i64,
    pub rank: i64,
}

/// Rank the whole input set. Output is in leaderboard order.
pub fn rank_entries(inputs: &[RankInput]) -> Vec<Ranked> {
    let mut sorted: Vec<RankInput> = inputs.to_vec();
    sorted.sort_by(|a, b| {
        b.points
            .cmp(&a.points)
            .then_with(|| a.joined_at.cmp(&b.joined_at))
            .then_with(|| a.entry_id.cmp(&b.entry_id))
    });

    let mut ranked: Vec<Ranked> = Vec::with_capacity(sorted.len());
    for (idx, input) in sorted.into_iter().enumerate() {
        let rank = match ranked.last() {
            Some(prev) if prev.points == input.points => prev.rank,
            _ => (idx + 1) as i64,
        };
        ranked.push(Ranked {
            entry_id: input.entry_id,
            points: input.points,
            rank,
        });
    }
    ranked
}

/// Rank persisted entries for the given pass.
pub fn rank_league(entries: &[Entry], pass: RankingPass) -> Vec<Ranked> {
    let inputs: Vec<RankInput> = entries
        .iter()
        .map(|e| RankInput {
            entry_id: e.id,
            points: pass.points_for(e),
            joined_at: e.joined_at,
        })
        .collect();
    rank_entries(&inputs)
}
