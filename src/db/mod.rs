//! Database module for SQLite operations.
//!
//! This module provides:
//! - Database initialization and schema migrations
//! - SQLite pragma configuration
//! - Repository layer: league settlement batches and the wallet ledger store

pub mod migrations;
pub mod repo;

pub use migrations::init_db;
pub use repo::{
    FinalStanding, LiveStanding, Repository, StoreError, TransactionFilter, TransitionOutcome,
};
