pub mod admin;
pub mod health;
pub mod identity;
pub mod leagues;
pub mod transactions;
pub mod wallets;

use crate::db::Repository;
use crate::orchestration::{Scheduler, WalletService};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub scheduler: Arc<Scheduler>,
    pub wallets: Arc<WalletService>,
}

impl AppState {
    pub fn new(
        repo: Arc<Repository>,
        scheduler: Arc<Scheduler>,
        wallets: Arc<WalletService>,
    ) -> Self {
        Self {
            repo,
            scheduler,
            wallets,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/admin/reconcile", post(admin::reconcile))
        .route("/v1/admin/leagues", post(leagues::create_league))
        .route("/v1/admin/leagues/:id/refinalize", post(admin::refinalize))
        .route("/v1/admin/wallets/:user_id/adjustments", post(wallets::adjust))
        .route("/v1/leagues/:id", get(leagues::get_league))
        .route("/v1/leagues/:id/leaderboard", get(leagues::get_leaderboard))
        .route("/v1/leagues/:id/entries", post(leagues::join_league))
        .route("/v1/wallets/me/deposits", post(wallets::request_deposit))
        .route("/v1/wallets/me/withdrawals", post(wallets::request_withdrawal))
        .route("/v1/wallets/:user_id", get(wallets::get_wallet))
        .route("/v1/transactions", get(transactions::list_transactions))
        .route("/v1/transactions/:id", get(transactions::get_transaction))
        .route("/v1/transactions/:id/:action", post(transactions::transition))
        .layer(cors)
        .with_state(state)
}
