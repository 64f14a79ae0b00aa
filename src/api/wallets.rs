use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::identity::Identity;
use crate::api::leagues::parse_amount;
use crate::api::transactions::TransactionDto;
use crate::api::AppState;
use crate::domain::{UserId, Wallet};
use crate::error::AppError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletDto {
    pub user_id: String,
    pub balance: String,
    pub currency: String,
    pub version: i64,
}

impl From<Wallet> for WalletDto {
    fn from(w: Wallet) -> Self {
        Self {
            user_id: w.user_id.to_string(),
            balance: w.balance.to_minor_string(),
            currency: w.currency,
            version: w.version,
        }
    }
}

pub async fn get_wallet(
    identity: Identity,
    Path(user_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<WalletDto>, AppError> {
    let wallet = state
        .wallets
        .wallet(&identity.0, &UserId::new(user_id))
        .await?;
    Ok(Json(wallet.into()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositRequest {
    pub amount: String,
    pub gateway_reference: String,
}

pub async fn request_deposit(
    identity: Identity,
    State(state): State<AppState>,
    Json(body): Json<DepositRequest>,
) -> Result<(StatusCode, Json<TransactionDto>), AppError> {
    if body.gateway_reference.trim().is_empty() {
        return Err(AppError::BadRequest("gatewayReference is required".into()));
    }
    let amount = parse_amount("amount", &body.amount)?;
    let tx = state
        .wallets
        .request_deposit(&identity.0, amount, body.gateway_reference.trim())
        .await?;
    Ok((StatusCode::CREATED, Json(tx.into())))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalRequest {
    pub amount: String,
    pub bank: serde_json::Value,
}

pub async fn request_withdrawal(
    identity: Identity,
    State(state): State<AppState>,
    Json(body): Json<WithdrawalRequest>,
) -> Result<(StatusCode, Json<TransactionDto>), AppError> {
    let amount = parse_amount("amount", &body.amount)?;
    let tx = state
        .wallets
        .request_withdrawal(&identity.0, amount, body.bank)
        .await?;
    Ok((StatusCode::CREATED, Json(tx.into())))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustmentRequest {
    pub amount: String,
    pub reason: String,
}

pub async fn adjust(
    identity: Identity,
    Path(user_id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<AdjustmentRequest>,
) -> Result<(StatusCode, Json<TransactionDto>), AppError> {
    let amount = parse_amount("amount", &body.amount)?;
    let tx = state
        .wallets
        .adjust(&identity.0, &UserId::new(user_id), amount, &body.reason)
        .await?;
    Ok((StatusCode::CREATED, Json(tx.into())))
}
