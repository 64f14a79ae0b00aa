use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

use crate::api::identity::Identity;
use crate::api::AppState;
use crate::domain::{
    Decimal, Entry, League, LeagueId, LeagueStatus, NewLeague, PeriodId, PrizeStructure, TeamId,
    TimeMs,
};
use crate::engine::{rank_league, RankingPass};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardQuery {
    pub pass: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardResponse {
    pub league_id: LeagueId,
    pub status: LeagueStatus,
    pub pass: &'static str,
    pub highest_period_points: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settlement_digest: Option<String>,
    pub rows: Vec<LeaderboardRow>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardRow {
    pub rank: i64,
    pub entry_id: i64,
    pub user_id: String,
    pub team_id: i64,
    pub points: i64,
    pub period_points: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winnings: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payout_status: Option<String>,
}

/// Leaderboard computed from stored points. `final` is only available once
/// the league is completed.
pub async fn get_leaderboard(
    Path(league_id): Path<i64>,
    Query(params): Query<LeaderboardQuery>,
    State(state): State<AppState>,
) -> Result<Json<LeaderboardResponse>, AppError> {
    let pass = match params.pass.as_deref().unwrap_or("live") {
        "live" => RankingPass::Live,
        "final" => RankingPass::Final,
        other => {
            return Err(AppError::BadRequest(format!(
                "pass must be live or final, got {}",
                other
            )))
        }
    };

    let league = load_league(&state, LeagueId::new(league_id)).await?;
    if pass == RankingPass::Final && league.status != LeagueStatus::Completed {
        return Err(AppError::Conflict(format!(
            "league {} has no final standings yet",
            league.id
        )));
    }

    let entries = state.repo.list_entries(league.id).await?;
    let by_id: HashMap<_, &Entry> = entries.iter().map(|e| (e.id, e)).collect();
    let rows = rank_league(&entries, pass)
        .into_iter()
        .filter_map(|r| {
            let entry = by_id.get(&r.entry_id)?;
            let settled = pass == RankingPass::Final;
            Some(LeaderboardRow {
                rank: r.rank,
                entry_id: r.entry_id.as_i64(),
                user_id: entry.user_id.to_string(),
                team_id: entry.team_id.as_i64(),
                points: r.points,
                period_points: entry.period_points,
                winnings: settled.then(|| entry.winnings.to_minor_string()),
                payout_status: settled.then(|| entry.payout_status.as_str().to_string()),
            })
        })
        .collect();

    Ok(Json(LeaderboardResponse {
        league_id: league.id,
        status: league.status,
        pass: match pass {
            RankingPass::Live => "live",
            RankingPass::Final => "final",
        },
        highest_period_points: league.highest_period_points,
        settlement_digest: league.settlement_digest,
        rows,
    }))
}

pub async fn get_league(
    Path(league_id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<League>, AppError> {
    Ok(Json(load_league(&state, LeagueId::new(league_id)).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLeagueRequest {
    pub name: String,
    pub period_id: i64,
    pub entry_fee: String,
    pub max_participants: i64,
    pub start_at_ms: i64,
    pub end_at_ms: i64,
    pub prize_structure: String,
    pub platform_fee_pct: String,
}

pub async fn create_league(
    identity: Identity,
    State(state): State<AppState>,
    Json(body): Json<CreateLeagueRequest>,
) -> Result<(StatusCode, Json<League>), AppError> {
    identity.require_admin()?;
    let prize_structure = PrizeStructure::from_str(&body.prize_structure)
        .map_err(AppError::BadRequest)?;
    let new = NewLeague {
        name: body.name,
        period_id: PeriodId::new(body.period_id),
        entry_fee: parse_amount("entryFee", &body.entry_fee)?,
        max_participants: body.max_participants,
        start_at: TimeMs::new(body.start_at_ms),
        end_at: TimeMs::new(body.end_at_ms),
        prize_structure,
        platform_fee_pct: parse_amount("platformFeePct", &body.platform_fee_pct)?,
    };
    let league = state.repo.insert_league(&new).await?;
    Ok((StatusCode::CREATED, Json(league)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinLeagueRequest {
    pub team_id: i64,
    #[serde(default)]
    pub points_at_join: i64,
}

pub async fn join_league(
    identity: Identity,
    Path(league_id): Path<i64>,
    State(state): State<AppState>,
    Json(body): Json<JoinLeagueRequest>,
) -> Result<(StatusCode, Json<Entry>), AppError> {
    let entry = state
        .wallets
        .join_league(
            &identity.0,
            LeagueId::new(league_id),
            TeamId::new(body.team_id),
            body.points_at_join,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn load_league(state: &AppState, league_id: LeagueId) -> Result<League, AppError> {
    state
        .repo
        .get_league(league_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("league {}", league_id)))
}

pub(crate) fn parse_amount(field: &str, raw: &str) -> Result<Decimal, AppError> {
    Decimal::from_str_canonical(raw)
        .map_err(|_| AppError::BadRequest(format!("{} is not a valid amount", field)))
}
