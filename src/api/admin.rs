use axum::extract::{Path, State};
use axum::Json;

use crate::api::identity::Identity;
use crate::api::AppState;
use crate::domain::{LeagueId, TimeMs};
use crate::error::AppError;
use crate::orchestration::ReconciliationReport;

/// Manual trigger: same work as one tick of the periodic loop.
pub async fn reconcile(
    identity: Identity,
    State(state): State<AppState>,
) -> Result<Json<ReconciliationReport>, AppError> {
    identity.require_admin()?;
    tracing::info!(admin = %identity.0.user_id, "Manual reconciliation requested");
    Ok(Json(state.scheduler.run_reconciliation(TimeMs::now()).await))
}

pub async fn refinalize(
    identity: Identity,
    Path(league_id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<ReconciliationReport>, AppError> {
    identity.require_admin()?;
    let league_id = LeagueId::new(league_id);
    if state.repo.get_league(league_id).await?.is_none() {
        return Err(AppError::NotFound(format!("league {}", league_id)));
    }
    tracing::info!(admin = %identity.0.user_id, league_id = %league_id, "Re-finalize requested");
    Ok(Json(state.scheduler.refinalize(league_id).await))
}
