//! Pure computation engine(s) for deterministic settlement logic.

pub mod prizes;
pub mod ranking;

pub use prizes::{compute_winnings, prize_pool, Payout, PrizeRow, PrizeTable, PrizeTableError};
pub use ranking::{rank_entries, rank_league, RankInput, Ranked, RankingPass};

use sha2::{Digest, Sha256};

/// Audit digest of final standings.
///
/// Hashes `(entry_id, rank, winnings)` in entry id order, so the same standings
/// always produce the same digest regardless of input order.
pub fn settlement_digest(payouts: &[Payout]) -> String {
    let mut sorted: Vec<&Payout> = payouts.iter().collect();
    sorted.sort_by_key(|p| p.entry_id);

    let mut hasher = Sha256::new();
    for p in sorted {
        hasher.update(p.entry_id.as_i64().to_le_bytes());
        hasher.update(p.rank.to_le_bytes());
        let winnings = p.winnings.to_minor_string();
        hasher.update((winnings.len() as u32).to_le_bytes());
        hasher.update(winnings.as_bytes());
    }
    hex::encode(hasher.finalize())
}
