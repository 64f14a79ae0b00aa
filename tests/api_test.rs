use axum::http::StatusCode;
use gameweek_ledger::api;
use gameweek_ledger::datasource::{MockScoringFeed, PeriodStatus, ScoringFeed};
use gameweek_ledger::db::init_db;
use gameweek_ledger::domain::{PeriodId, TeamId, TimeMs};
use gameweek_ledger::orchestration::{
    LeagueReconciler, Scheduler, SchedulerSettings, WalletService,
};
use gameweek_ledger::Repository;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;

struct TestApp {
    app: axum::Router,
    feed: MockScoringFeed,
    _temp: TempDir,
}

async fn setup_test_app() -> TestApp {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool));

    let feed = MockScoringFeed::new();
    let shared: Arc<dyn ScoringFeed> = Arc::new(feed.clone());
    let reconciler = Arc::new(LeagueReconciler::new(shared, repo.clone(), "GBP".to_string()));
    let scheduler = Arc::new(Scheduler::new(
        reconciler,
        repo.clone(),
        SchedulerSettings::default(),
    ));
    let wallets = Arc::new(WalletService::new(repo.clone(), "GBP".to_string()));
    let app = api::create_router(api::AppState::new(repo, scheduler, wallets));

    TestApp {
        app,
        feed,
        _temp: temp_dir,
    }
}

enum As<'a> {
    Anonymous,
    User(&'a str),
    Admin,
}

async fn request(
    app: &axum::Router,
    method: &str,
    uri: &str,
    who: As<'_>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = axum::http::Request::builder().method(method).uri(uri);
    match who {
        As::Anonymous => {}
        As::User(id) => builder = builder.header("x-user-id", id),
        As::Admin => {
            builder = builder.header("x-user-id", "ops").header("x-admin", "true");
        }
    }
    let req = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(axum::body::Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(axum::body::Body::empty()).unwrap(),
    };

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

async fn create_league(app: &axum::Router) -> i64 {
    let now = TimeMs::now().as_ms();
    let (status, body) = request(
        app,
        "POST",
        "/v1/admin/leagues",
        As::Admin,
        Some(json!({
            "name": "Gameweek 12",
            "periodId": 12,
            "entryFee": "1000",
            "maxParticipants": 20,
            "startAtMs": now - 1_000,
            "endAtMs": now + 86_400_000,
            "prizeStructure": "tri",
            "platformFeePct": "10"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["status"], "upcoming");
    body["id"].as_i64().unwrap()
}

#[tokio::test]
async fn test_health_and_ready() {
    let t = setup_test_app().await;
    let (status, body) = request(&t.app, "GET", "/health", As::Anonymous, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = request(&t.app, "GET", "/ready", As::Anonymous, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_reconcile_requires_admin() {
    let t = setup_test_app().await;
    let (status, body) =
        request(&t.app, "POST", "/v1/admin/reconcile", As::Anonymous, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let (status, _) = request(&t.app, "POST", "/v1/admin/reconcile", As::User("alice"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = request(&t.app, "POST", "/v1/admin/reconcile", As::Admin, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["processedCount"], 0);
    assert_eq!(body["errors"], json!([]));
}

#[tokio::test]
async fn test_full_league_settlement_over_http() {
    let t = setup_test_app().await;
    let league_id = create_league(&t.app).await;

    for (user, team, points) in [("alice", 101, 80), ("bob", 102, 80), ("carol", 103, 60)] {
        let (status, _) = request(
            &t.app,
            "POST",
            &format!("/v1/admin/wallets/{}/adjustments", user),
            As::Admin,
            Some(json!({"amount": "1000", "reason": "promo credit"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = request(
            &t.app,
            "POST",
            &format!("/v1/leagues/{}/entries", league_id),
            As::User(user),
            Some(json!({"teamId": team})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);

        t.feed.set_points(PeriodId::new(12), TeamId::new(team), points);
    }

    // Final standings are not available before settlement.
    let (status, _) = request(
        &t.app,
        "GET",
        &format!("/v1/leagues/{}/leaderboard?pass=final", league_id),
        As::Anonymous,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    t.feed
        .set_status(PeriodId::new(12), PeriodStatus::new(true, true));
    let (status, report) = request(&t.app, "POST", "/v1/admin/reconcile", As::Admin, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["activatedCount"], 1);
    assert_eq!(report["completedCount"], 1);

    let (status, board) = request(
        &t.app,
        "GET",
        &format!("/v1/leagues/{}/leaderboard?pass=final", league_id),
        As::Anonymous,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(board["status"], "completed");
    let rows = board["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["rank"], 1);
    assert_eq!(rows[1]["rank"], 1);
    assert_eq!(rows[2]["rank"], 3);
    assert_eq!(rows[0]["winnings"], "810.00");
    assert_eq!(rows[2]["winnings"], "405.00");
    assert_eq!(rows[2]["payoutStatus"], "completed");

    let (status, wallet) =
        request(&t.app, "GET", "/v1/wallets/carol", As::User("carol"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(wallet["balance"], "405.00");
    assert_eq!(wallet["currency"], "GBP");

    let (status, _) = request(&t.app, "GET", "/v1/wallets/carol", As::User("alice"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, report) = request(
        &t.app,
        "POST",
        &format!("/v1/admin/leagues/{}/refinalize", league_id),
        As::Admin,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["winningsCredited"], 0);
    assert_eq!(
        report["settlementDigests"][0]["digest"],
        board["settlementDigest"]
    );

    let (status, txs) = request(
        &t.app,
        "GET",
        "/v1/transactions?type=WINNINGS",
        As::Admin,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(txs.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_deposit_transition_endpoints() {
    let t = setup_test_app().await;
    let (status, tx) = request(
        &t.app,
        "POST",
        "/v1/wallets/me/deposits",
        As::User("alice"),
        Some(json!({"amount": "50.00", "gatewayReference": "psp_abc"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(tx["status"], "PENDING");
    let id = tx["id"].as_str().unwrap().to_string();

    let uri = format!("/v1/transactions/{}/confirm", id);
    let (status, _) = request(&t.app, "POST", &uri, As::User("alice"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = request(&t.app, "POST", &uri, As::Admin, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "applied");
    assert_eq!(body["transaction"]["status"], "COMPLETED");

    let (status, body) = request(&t.app, "POST", &uri, As::Admin, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "unchanged");

    let (_, wallet) = request(&t.app, "GET", "/v1/wallets/alice", As::User("alice"), None).await;
    assert_eq!(wallet["balance"], "50.00");

    let (status, _) = request(
        &t.app,
        "POST",
        &format!("/v1/transactions/{}/teleport", id),
        As::Admin,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_withdrawal_over_balance_is_bad_request() {
    let t = setup_test_app().await;
    let (status, body) = request(
        &t.app,
        "POST",
        "/v1/wallets/me/withdrawals",
        As::User("alice"),
        Some(json!({"amount": "500", "bank": {"iban": "GB00TEST"}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("insufficient"));
}

#[tokio::test]
async fn test_leaderboard_validation() {
    let t = setup_test_app().await;
    let (status, _) = request(
        &t.app,
        "GET",
        "/v1/leagues/999/leaderboard",
        As::Anonymous,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let league_id = create_league(&t.app).await;
    let (status, _) = request(
        &t.app,
        "GET",
        &format!("/v1/leagues/{}/leaderboard?pass=sideways", league_id),
        As::Anonymous,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, board) = request(
        &t.app,
        "GET",
        &format!("/v1/leagues/{}/leaderboard", league_id),
        As::Anonymous,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(board["pass"], "live");
    assert_eq!(board["rows"], json!([]));
}
