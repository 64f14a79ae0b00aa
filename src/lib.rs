pub mod api;
pub mod config;
pub mod datasource;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;

pub use config::Config;
pub use datasource::{FplScoringFeed, MockScoringFeed, PeriodStatus, ScoringError, ScoringFeed};
pub use db::{init_db, Repository};
pub use domain::{
    Decimal, Entry, League, LeagueId, LeagueStatus, PrizeStructure, TimeMs, Transaction,
    TransactionStatus, TransactionType, UserId, Wallet,
};
pub use error::AppError;
pub use orchestration::{LeagueReconciler, ReconciliationReport, Scheduler, WalletService};
