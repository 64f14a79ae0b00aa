use gameweek_ledger::db::{init_db, StoreError, TransactionFilter, TransitionOutcome};
use gameweek_ledger::domain::{
    Decimal, NewLeague, NewTransaction, PeriodId, PrizeStructure, TeamId, TimeMs, TransactionStatus,
    TransactionType, UserId, MAX_AMOUNT_UNITS,
};
use gameweek_ledger::orchestration::{Caller, WalletError, WalletService};
use gameweek_ledger::Repository;
use std::sync::Arc;
use tempfile::TempDir;

struct TestLedger {
    repo: Arc<Repository>,
    wallets: WalletService,
    _temp: TempDir,
}

async fn setup() -> TestLedger {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool));
    let wallets = WalletService::new(repo.clone(), "GBP".to_string());
    TestLedger {
        repo,
        wallets,
        _temp: temp_dir,
    }
}

fn money(s: &str) -> Decimal {
    Decimal::from_str_canonical(s).unwrap()
}

fn admin() -> Caller {
    Caller::admin(UserId::new("ops"))
}

fn user(id: &str) -> Caller {
    Caller::user(UserId::new(id))
}

async fn balance(t: &TestLedger, id: &str) -> String {
    t.repo
        .get_wallet(&UserId::new(id))
        .await
        .unwrap()
        .map(|w| w.balance.to_minor_string())
        .unwrap_or_else(|| "0.00".to_string())
}

async fn deposit(t: &TestLedger, who: &str, amount: &str, reference: &str) -> String {
    let tx = t
        .wallets
        .request_deposit(&user(who), money(amount), reference)
        .await
        .unwrap();
    t.wallets.confirm_deposit(&admin(), &tx.id).await.unwrap();
    tx.id
}

#[tokio::test]
async fn test_deposit_confirmed_twice_credits_once() {
    let t = setup().await;
    let tx = t
        .wallets
        .request_deposit(&user("alice"), money("100"), "psp_001")
        .await
        .unwrap();
    assert_eq!(tx.status, TransactionStatus::Pending);
    assert_eq!(balance(&t, "alice").await, "0.00");

    let first = t.wallets.confirm_deposit(&admin(), &tx.id).await.unwrap();
    assert!(first.is_applied());
    let second = t.wallets.confirm_deposit(&admin(), &tx.id).await.unwrap();
    assert!(matches!(second, TransitionOutcome::Unchanged(_)));
    assert_eq!(second.transaction().status, TransactionStatus::Completed);

    assert_eq!(balance(&t, "alice").await, "100.00");
}

#[tokio::test]
async fn test_deposit_request_is_idempotent_on_reference() {
    let t = setup().await;
    let a = t
        .wallets
        .request_deposit(&user("alice"), money("25.50"), "psp_777")
        .await
        .unwrap();
    let b = t
        .wallets
        .request_deposit(&user("alice"), money("25.50"), "psp_777")
        .await
        .unwrap();
    assert_eq!(a.id, b.id);

    let all = t
        .repo
        .list_transactions(&TransactionFilter::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn test_failed_deposit_never_credits() {
    let t = setup().await;
    let tx = t
        .wallets
        .request_deposit(&user("alice"), money("40"), "psp_002")
        .await
        .unwrap();
    let failed = t
        .wallets
        .fail_deposit(&admin(), &tx.id, Some("card declined"))
        .await
        .unwrap();
    assert_eq!(failed.transaction().status, TransactionStatus::Failed);
    assert_eq!(failed.transaction().note.as_deref(), Some("card declined"));

    // Terminal: a late confirmation is a no-op.
    let late = t.wallets.confirm_deposit(&admin(), &tx.id).await.unwrap();
    assert!(matches!(late, TransitionOutcome::Unchanged(_)));
    assert_eq!(balance(&t, "alice").await, "0.00");
}

#[tokio::test]
async fn test_withdrawal_rejected_at_request_when_balance_short() {
    let t = setup().await;
    deposit(&t, "alice", "300", "psp_010").await;

    let err = t
        .wallets
        .request_withdrawal(&user("alice"), money("500"), serde_json::json!({"iban": "GB00"}))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WalletError::Store(StoreError::InsufficientBalance { .. })
    ));
    assert_eq!(balance(&t, "alice").await, "300.00");
}

#[tokio::test]
async fn test_store_declines_withdrawal_over_balance() {
    let t = setup().await;
    deposit(&t, "alice", "300", "psp_015").await;

    // Written straight to the store, bypassing the request-time check.
    let w = t
        .repo
        .create_transaction(
            &NewTransaction::new(UserId::new("alice"), TransactionType::Withdrawal, money("500")),
            "GBP",
        )
        .await
        .unwrap();
    assert_eq!(w.status, TransactionStatus::RequiresApproval);

    let outcome = t
        .repo
        .transition_transaction(&w.id, TransactionStatus::Processing, None)
        .await
        .unwrap();
    match outcome {
        TransitionOutcome::Declined { transaction, reason } => {
            assert_eq!(transaction.status, TransactionStatus::Failed);
            assert!(reason.contains("insufficient"));
            assert_eq!(transaction.note.as_deref(), Some(reason.as_str()));
        }
        other => panic!("expected Declined, got {:?}", other),
    }
    assert_eq!(balance(&t, "alice").await, "300.00");
}

#[tokio::test]
async fn test_withdrawal_approval_declined_when_balance_moved() {
    let t = setup().await;
    deposit(&t, "alice", "600", "psp_011").await;

    let big = t
        .wallets
        .request_withdrawal(&user("alice"), money("500"), serde_json::json!({"iban": "GB00"}))
        .await
        .unwrap();
    let small = t
        .wallets
        .request_withdrawal(&user("alice"), money("300"), serde_json::json!({"iban": "GB00"}))
        .await
        .unwrap();
    assert_eq!(big.status, TransactionStatus::RequiresApproval);

    let approved = t.wallets.approve_withdrawal(&admin(), &small.id).await.unwrap();
    assert!(approved.is_applied());
    assert_eq!(approved.transaction().status, TransactionStatus::Processing);
    assert_eq!(balance(&t, "alice").await, "300.00");

    let declined = t.wallets.approve_withdrawal(&admin(), &big.id).await.unwrap();
    match declined {
        TransitionOutcome::Declined { transaction, .. } => {
            assert_eq!(transaction.status, TransactionStatus::Failed)
        }
        other => panic!("expected Declined, got {:?}", other),
    }
    assert_eq!(balance(&t, "alice").await, "300.00");

    let paid = t.wallets.complete_withdrawal(&admin(), &small.id).await.unwrap();
    assert!(paid.is_applied());
    assert_eq!(paid.transaction().status, TransactionStatus::Completed);
    assert_eq!(balance(&t, "alice").await, "300.00");
}

#[tokio::test]
async fn test_withdrawal_reject_leaves_balance() {
    let t = setup().await;
    deposit(&t, "alice", "100", "psp_012").await;
    let w = t
        .wallets
        .request_withdrawal(&user("alice"), money("60"), serde_json::json!({"iban": "GB00"}))
        .await
        .unwrap();

    let rejected = t
        .wallets
        .reject_withdrawal(&admin(), &w.id, Some("kyc pending"))
        .await
        .unwrap();
    assert_eq!(rejected.transaction().status, TransactionStatus::Failed);
    assert_eq!(balance(&t, "alice").await, "100.00");
}

#[tokio::test]
async fn test_only_admins_settle_withdrawals() {
    let t = setup().await;
    deposit(&t, "alice", "100", "psp_013").await;
    let w = t
        .wallets
        .request_withdrawal(&user("alice"), money("60"), serde_json::json!({"iban": "GB00"}))
        .await
        .unwrap();

    let err = t
        .wallets
        .approve_withdrawal(&user("alice"), &w.id)
        .await
        .unwrap_err();
    assert!(matches!(err, WalletError::Forbidden(_)));

    let err = t
        .wallets
        .adjust(&user("alice"), &UserId::new("alice"), money("1000"), "free money")
        .await
        .unwrap_err();
    assert!(matches!(err, WalletError::Forbidden(_)));
    assert_eq!(balance(&t, "alice").await, "100.00");
}

#[tokio::test]
async fn test_amounts_above_limit_are_rejected() {
    let t = setup().await;
    let err = t
        .wallets
        .adjust(
            &admin(),
            &UserId::new("alice"),
            money("79228162514264337593543950335"),
            "typo",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WalletError::Store(StoreError::Rejected(_))));

    let over = Decimal::from_i64(MAX_AMOUNT_UNITS + 1);
    let err = t
        .wallets
        .request_deposit(&user("alice"), over, "psp_big")
        .await
        .unwrap_err();
    assert!(matches!(err, WalletError::Store(StoreError::Rejected(_))));
    assert_eq!(balance(&t, "alice").await, "0.00");
}

#[tokio::test]
async fn test_huge_credits_never_panic_the_caller() {
    let t = setup().await;
    let wallets = t.wallets.clone();
    let handle = tokio::spawn(async move {
        let limit = Decimal::from_i64(MAX_AMOUNT_UNITS);
        let alice = UserId::new("alice");
        let first = wallets.adjust(&admin(), &alice, limit, "max").await;
        let huge = money("79228162514264337593543950335");
        let second = wallets.adjust(&admin(), &alice, huge, "overflow").await;
        let third = wallets.adjust(&admin(), &alice, money("1"), "top up").await;
        (first.is_ok(), second.is_err(), third.is_ok())
    });
    assert_eq!(handle.await.unwrap(), (true, true, true));
    assert_eq!(balance(&t, "alice").await, "1000000001.00");
}

#[tokio::test]
async fn test_illegal_transition_rejected_without_write() {
    let t = setup().await;
    let tx = t
        .wallets
        .request_deposit(&user("alice"), money("10"), "psp_014")
        .await
        .unwrap();

    let err = t
        .repo
        .transition_transaction(&tx.id, TransactionStatus::Processing, None)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::IllegalTransition(_)));

    let stored = t.repo.get_transaction(&tx.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Pending);

    // Wrong flow for the transaction type.
    let err = t
        .wallets
        .approve_withdrawal(&admin(), &tx.id)
        .await
        .unwrap_err();
    assert!(matches!(err, WalletError::Store(StoreError::Rejected(_))));
}

#[tokio::test]
async fn test_concurrent_confirmations_apply_once_each() {
    let t = setup().await;
    let mut ids = Vec::new();
    for i in 0..10 {
        let tx = t
            .wallets
            .request_deposit(&user("alice"), money("10"), &format!("psp_c{}", i))
            .await
            .unwrap();
        ids.push(tx.id);
    }

    let ops = admin();
    let confirmations = ids
        .iter()
        .chain(ids.iter())
        .map(|id| t.wallets.confirm_deposit(&ops, id));
    let outcomes = futures::future::join_all(confirmations).await;

    let applied = outcomes
        .iter()
        .filter(|o| o.as_ref().map(|o| o.is_applied()).unwrap_or(false))
        .count();
    assert_eq!(applied, 10);
    assert!(outcomes.iter().all(|o| o.is_ok()));
    assert_eq!(balance(&t, "alice").await, "100.00");
}

#[tokio::test]
async fn test_concurrent_approvals_never_overdraw() {
    let t = setup().await;
    deposit(&t, "alice", "100", "psp_020").await;

    let mut ids = Vec::new();
    for _ in 0..4 {
        let w = t
            .wallets
            .request_withdrawal(&user("alice"), money("40"), serde_json::json!({"iban": "GB00"}))
            .await
            .unwrap();
        ids.push(w.id);
    }

    let ops = admin();
    let outcomes = futures::future::join_all(
        ids.iter().map(|id| t.wallets.approve_withdrawal(&ops, id)),
    )
    .await;
    let applied = outcomes
        .iter()
        .filter(|o| o.as_ref().map(|o| o.is_applied()).unwrap_or(false))
        .count();
    assert_eq!(applied, 2);
    assert_eq!(balance(&t, "alice").await, "20.00");
}

#[tokio::test]
async fn test_join_league_captures_fee_atomically() {
    let t = setup().await;
    let now = TimeMs::now().as_ms();
    let league = t
        .repo
        .insert_league(&NewLeague {
            name: "Duo".to_string(),
            period_id: PeriodId::new(3),
            entry_fee: money("5"),
            max_participants: 2,
            start_at: TimeMs::new(now + 60_000),
            end_at: TimeMs::new(now + 120_000),
            prize_structure: PrizeStructure::Duo,
            platform_fee_pct: Decimal::zero(),
        })
        .await
        .unwrap();

    // No funds: nothing is written.
    let err = t
        .wallets
        .join_league(&user("alice"), league.id, TeamId::new(1), 0)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WalletError::Store(StoreError::InsufficientBalance { .. })
    ));
    assert!(t.repo.list_entries(league.id).await.unwrap().is_empty());

    deposit(&t, "alice", "12", "psp_030").await;
    t.wallets
        .join_league(&user("alice"), league.id, TeamId::new(1), 40)
        .await
        .unwrap();
    assert_eq!(balance(&t, "alice").await, "7.00");

    let err = t
        .wallets
        .join_league(&user("alice"), league.id, TeamId::new(1), 40)
        .await
        .unwrap_err();
    assert!(matches!(err, WalletError::Store(StoreError::Rejected(_))));
    assert_eq!(balance(&t, "alice").await, "7.00");

    let fees = t
        .repo
        .list_transactions(&TransactionFilter {
            tx_type: Some(TransactionType::EntryFee),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(fees.len(), 1);
    assert_eq!(fees[0].status, TransactionStatus::Completed);
}

#[tokio::test]
async fn test_users_only_see_their_own_transactions() {
    let t = setup().await;
    deposit(&t, "alice", "10", "psp_040").await;
    deposit(&t, "bob", "20", "psp_041").await;

    let mine = t
        .wallets
        .transactions(&user("alice"), TransactionFilter::default())
        .await
        .unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].user_id, UserId::new("alice"));

    let err = t
        .wallets
        .transactions(
            &user("alice"),
            TransactionFilter {
                user_id: Some(UserId::new("bob")),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WalletError::Forbidden(_)));

    let everything = t
        .wallets
        .transactions(&admin(), TransactionFilter::default())
        .await
        .unwrap();
    assert_eq!(everything.len(), 2);
}
