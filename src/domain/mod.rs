//! Domain types for league settlement and the wallet ledger.
//!
//! This module provides:
//! - Fixed-point money via the Decimal wrapper
//! - Typed identifiers and TimeMs
//! - League, Entry, Wallet and Transaction records
//! - The pure transaction transition table

pub mod decimal;
pub mod entry;
pub mod league;
pub mod ledger;
pub mod primitives;

pub use decimal::Decimal;
pub use entry::{Entry, PayoutStatus};
pub use league::{League, LeagueStatus, NewLeague, PrizeStructure};
pub use ledger::{
    plan_transition, BalanceEffect, Direction, EffectRefused, IllegalTransition, NewTransaction,
    Transaction, TransactionStatus, TransactionType, TransitionPlan, Wallet, MAX_AMOUNT_UNITS,
};
pub use primitives::{EntryId, LeagueId, PeriodId, TeamId, TimeMs, UserId, WalletId};
