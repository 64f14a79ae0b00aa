use anyhow::Context;
use gameweek_ledger::datasource::{FplScoringFeed, ScoringFeed};
use gameweek_ledger::orchestration::{LeagueReconciler, Scheduler, SchedulerSettings, WalletService};
use gameweek_ledger::{api, config::Config, db::init_db, Repository};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let config = Config::from_env().context("loading configuration")?;

    let pool = init_db(&config.database_path)
        .await
        .with_context(|| format!("opening database at {}", config.database_path))?;

    let repo = Arc::new(Repository::new(pool));
    let feed: Arc<dyn ScoringFeed> = Arc::new(
        FplScoringFeed::new(config.scoring_api_url.clone())
            .with_retry_budget(config.league_timeout / 4),
    );
    let reconciler = Arc::new(LeagueReconciler::new(
        feed,
        repo.clone(),
        config.currency.clone(),
    ));
    let scheduler = Arc::new(Scheduler::new(
        reconciler,
        repo.clone(),
        SchedulerSettings {
            batch_size: config.reconcile_batch_size,
            concurrency: config.reconcile_concurrency,
            league_timeout: config.league_timeout,
        },
    ));
    let wallets = Arc::new(WalletService::new(repo.clone(), config.currency.clone()));

    let _reconcile_loop = match config.reconcile_interval {
        Some(every) => {
            tracing::info!(interval_ms = every.as_millis() as u64, "Starting reconciliation loop");
            Some(scheduler.clone().spawn_periodic(every))
        }
        None => {
            tracing::info!("Reconciliation loop disabled, manual trigger only");
            None
        }
    };

    let app = api::create_router(api::AppState::new(repo, scheduler, wallets));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
