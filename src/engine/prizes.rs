//! Prize pool and winnings computation.

use super::Ranked;
use crate::domain::{Decimal, EntryId, PrizeStructure};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrizeTableError {
    #[error("prize table is empty")]
    Empty,
    #[error("prize rank must be >= 1, got {0}")]
    InvalidRank(i64),
    #[error("duplicate prize rank {0}")]
    DuplicateRank(i64),
    #[error("prize share for rank {0} must be positive")]
    NonPositiveShare(i64),
    #[error("prize shares must sum to 100, got {0}")]
    BadTotal(Decimal),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrizeRow {
    pub rank: i64,
    pub share_pct: Decimal,
}

/// Validated prize distribution: ranks unique, shares positive and summing to 100.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrizeTable {
    rows: Vec<PrizeRow>,
}

impl PrizeTable {
    pub fn new(mut rows: Vec<PrizeRow>) -> Result<Self, PrizeTableError> {
        if rows.is_empty() {
            return Err(PrizeTableError::Empty);
        }
        rows.sort_by_key(|r| r.rank);
        for pair in rows.windows(2) {
            if pair[0].rank == pair[1].rank {
                return Err(PrizeTableError::DuplicateRank(pair[0].rank));
            }
        }
        for row in &rows {
            if row.rank < 1 {
                return Err(PrizeTableError::InvalidRank(row.rank));
            }
            if !row.share_pct.is_positive() {
                return Err(PrizeTableError::NonPositiveShare(row.rank));
            }
        }
        let total: Decimal = rows.iter().map(|r| r.share_pct).sum();
        if total != Decimal::hundred() {
            return Err(PrizeTableError::BadTotal(total));
        }
        Ok(Self { rows })
    }

    pub fn for_structure(structure: PrizeStructure) -> Result<Self, PrizeTableError> {
        Self::new(
            structure
                .shares()
                .iter()
                .map(|&(rank, pct)| PrizeRow {
                    rank: rank as i64,
                    share_pct: Decimal::from_i64(pct as i64),
                })
                .collect(),
        )
    }

    pub fn rows(&self) -> &[PrizeRow] {
        &self.rows
    }
}

/// `entry_fee * paid_participants * (1 - platform_fee_pct / 100)`, truncated to minor units.
///
/// `None` when the gross pool is out of range.
pub fn prize_pool(
    entry_fee: Decimal,
    paid_participants: i64,
    platform_fee_pct: Decimal,
) -> Option<Decimal> {
    let gross = entry_fee.checked_mul(Decimal::from_i64(paid_participants))?;
    let house_cut = platform_fee_pct.percent_of(gross);
    Some((gross - house_cut).round_minor())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Payout {
    pub entry_id: EntryId,
    pub rank: i64,
    pub winnings: Decimal,
}

/// Split each prize row's share evenly among the entries occupying that rank.
///
/// Ranks with no prize row, and prize rows with no occupant, pay nothing. Each
/// payout is truncated to minor units; any remainder stays unallocated. Output
/// follows the input order.
pub fn compute_winnings(ranked: &[Ranked], table: &PrizeTable, pool: Decimal) -> Vec<Payout> {
    let mut occupants: BTreeMap<i64, i64> = BTreeMap::new();
    for r in ranked {
        *occupants.entry(r.rank).or_default() += 1;
    }

    let per_rank: BTreeMap<i64, Decimal> = table
        .rows()
        .iter()
        .filter_map(|row| {
            let count = *occupants.get(&row.rank)?;
            let share = row.share_pct.percent_of(pool);
            Some((row.rank, (share / Decimal::from_i64(count)).round_minor()))
        })
        .collect();

    ranked
        .iter()
        .map(|r| Payout {
            entry_id: r.entry_id,
            rank: r.rank,
            winnings: per_rank.get(&r.rank).copied().unwrap_or_else(Decimal::zero),
        })
        .collect()
}
