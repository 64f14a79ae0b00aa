use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::api::identity::Identity;
use crate::api::AppState;
use crate::db::{TransactionFilter, TransitionOutcome};
use crate::domain::{TimeMs, Transaction, TransactionStatus, TransactionType, UserId};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionsQuery {
    pub user_id: Option<String>,
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub tx_type: Option<String>,
    pub from_ms: Option<i64>,
    pub to_ms: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDto {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub status: TransactionStatus,
    pub amount: String,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<Transaction> for TransactionDto {
    fn from(t: Transaction) -> Self {
        Self {
            id: t.id,
            user_id: t.user_id.to_string(),
            tx_type: t.tx_type,
            status: t.status,
            amount: t.amount.to_minor_string(),
            currency: t.currency,
            external_reference: t.external_reference,
            metadata: t.metadata,
            note: t.note,
            created_at: t.created_at.as_ms(),
            updated_at: t.updated_at.as_ms(),
        }
    }
}

pub async fn list_transactions(
    identity: Identity,
    Query(params): Query<TransactionsQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<TransactionDto>>, AppError> {
    let from_ms = params.from_ms.map(TimeMs::new);
    let to_ms = params.to_ms.map(TimeMs::new);
    if let (Some(from_ms), Some(to_ms)) = (from_ms, to_ms) {
        if from_ms > to_ms {
            return Err(AppError::BadRequest("fromMs must be <= toMs".into()));
        }
    }

    let filter = TransactionFilter {
        user_id: params.user_id.map(UserId::new),
        status: params
            .status
            .as_deref()
            .map(TransactionStatus::from_str)
            .transpose()
            .map_err(AppError::BadRequest)?,
        tx_type: params
            .tx_type
            .as_deref()
            .map(TransactionType::from_str)
            .transpose()
            .map_err(AppError::BadRequest)?,
        from_ms,
        to_ms,
        limit: params.limit,
    };

    let txs = state.wallets.transactions(&identity.0, filter).await?;
    Ok(Json(txs.into_iter().map(TransactionDto::from).collect()))
}

pub async fn get_transaction(
    identity: Identity,
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<TransactionDto>, AppError> {
    let tx = state.wallets.transaction(&identity.0, &id).await?;
    Ok(Json(tx.into()))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionResponse {
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub transaction: TransactionDto,
}

impl From<TransitionOutcome> for TransitionResponse {
    fn from(outcome: TransitionOutcome) -> Self {
        match outcome {
            TransitionOutcome::Applied(t) => Self {
                outcome: "applied",
                reason: None,
                transaction: t.into(),
            },
            TransitionOutcome::Unchanged(t) => Self {
                outcome: "unchanged",
                reason: None,
                transaction: t.into(),
            },
            TransitionOutcome::Declined {
                transaction,
                reason,
            } => Self {
                outcome: "declined",
                reason: Some(reason),
                transaction: transaction.into(),
            },
        }
    }
}

/// `confirm`/`fail` settle deposits, `approve`/`reject`/`complete` move withdrawals.
pub async fn transition(
    identity: Identity,
    Path((id, action)): Path<(String, String)>,
    State(state): State<AppState>,
    body: Option<Json<TransitionRequest>>,
) -> Result<Json<TransitionResponse>, AppError> {
    let reason = body.and_then(|Json(b)| b.reason);
    let caller = &identity.0;
    let wallets = &state.wallets;

    let outcome = match action.as_str() {
        "confirm" => wallets.confirm_deposit(caller, &id).await?,
        "fail" => wallets.fail_deposit(caller, &id, reason.as_deref()).await?,
        "approve" => wallets.approve_withdrawal(caller, &id).await?,
        "reject" => wallets.reject_withdrawal(caller, &id, reason.as_deref()).await?,
        "complete" => wallets.complete_withdrawal(caller, &id).await?,
        other => return Err(AppError::NotFound(format!("unknown action {}", other))),
    };
    Ok(Json(outcome.into()))
}
