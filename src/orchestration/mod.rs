pub mod reconciler;
pub mod scheduler;
pub mod wallet;

pub use reconciler::{LeagueOutcome, LeagueReconciler, ReconcileError};
pub use scheduler::{LeagueFailure, ReconciliationReport, Scheduler, SchedulerSettings};
pub use wallet::{Caller, WalletError, WalletService};
