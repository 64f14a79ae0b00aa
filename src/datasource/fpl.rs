//! Fantasy Premier League style HTTP scoring feed.

use super::{PeriodStatus, ScoringError, ScoringFeed};
use crate::domain::{PeriodId, TeamId};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Concurrent per-team requests inside one `live_points` call.
const TEAM_FETCH_CONCURRENCY: usize = 8;

/// Default total retry time for one upstream request.
const DEFAULT_RETRY_BUDGET: Duration = Duration::from_secs(5);

/// Scoring feed backed by the public fantasy API.
#[derive(Debug, Clone)]
pub struct FplScoringFeed {
    client: Client,
    base_url: String,
    retry_budget: Duration,
}

impl FplScoringFeed {
    /// Create a new feed client.
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            retry_budget: DEFAULT_RETRY_BUDGET,
        }
    }

    /// Cap the time spent retrying any single request. Keep it well under the
    /// per-league timeout so a flaky upstream surfaces as a feed error.
    pub fn with_retry_budget(mut self, budget: Duration) -> Self {
        self.retry_budget = budget;
        self
    }

    /// GET a JSON document. `Ok(None)` on 404.
    async fn get_json(&self, path: &str) -> Result<Option<serde_json::Value>, ScoringError> {
        let url = format!("{}{}", self.base_url, path);
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(self.retry_budget),
            ..Default::default()
        };

        retry(backoff, || async {
            let response = self.client.get(&url).send().await.map_err(|e| {
                backoff::Error::transient(ScoringError::NetworkError(e.to_string()))
            })?;

            let status = response.status();
            if status == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            if status == StatusCode::TOO_MANY_REQUESTS {
                return Err(backoff::Error::transient(ScoringError::RateLimited));
            }
            if status.is_server_error() {
                return Err(backoff::Error::transient(ScoringError::HttpError {
                    status: status.as_u16(),
                    message: "Server error".to_string(),
                }));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(ScoringError::HttpError {
                    status: status.as_u16(),
                    message: "Client error".to_string(),
                }));
            }

            response
                .json::<serde_json::Value>()
                .await
                .map(Some)
                .map_err(|e| backoff::Error::permanent(ScoringError::ParseError(e.to_string())))
        })
        .await
    }

    async fn team_points(
        &self,
        period_id: PeriodId,
        team_id: TeamId,
    ) -> Result<Option<(TeamId, i64)>, ScoringError> {
        let path = format!("/api/entry/{}/event/{}/picks/", team_id, period_id);
        match self.get_json(&path).await? {
            Some(json) => parse_team_points(&json).map(|points| Some((team_id, points))),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ScoringFeed for FplScoringFeed {
    async fn period_status(&self, period_id: PeriodId) -> Result<PeriodStatus, ScoringError> {
        debug!(period_id = %period_id, "Fetching period status");
        let json = self
            .get_json("/api/bootstrap-static/")
            .await?
            .ok_or_else(|| ScoringError::Other("bootstrap document not found".to_string()))?;
        parse_period_status(&json, period_id)
    }

    /// The upstream has no multi-team endpoint, so the batch fans out to one
    /// picks request per team with bounded concurrency. Any hard failure fails
    /// the whole batch.
    async fn live_points(
        &self,
        period_id: PeriodId,
        team_ids: &[TeamId],
    ) -> Result<HashMap<TeamId, i64>, ScoringError> {
        debug!(
            period_id = %period_id,
            teams = team_ids.len(),
            "Fetching live points"
        );

        let found: Vec<Option<(TeamId, i64)>> = stream::iter(team_ids.iter().copied())
            .map(|team_id| self.team_points(period_id, team_id))
            .buffer_unordered(TEAM_FETCH_CONCURRENCY)
            .try_collect()
            .await?;

        Ok(found.into_iter().flatten().collect())
    }
}

fn parse_period_status(
    json: &serde_json::Value,
    period_id: PeriodId,
) -> Result<PeriodStatus, ScoringError> {
    let events = json
        .get("events")
        .and_then(|v| v.as_array())
        .ok_or_else(|| ScoringError::ParseError("Missing events array".to_string()))?;

    let event = events
        .iter()
        .find(|e| e.get("id").and_then(|v| v.as_i64()) == Some(period_id.as_i64()))
        .ok_or(ScoringError::UnknownPeriod(period_id))?;

    let flag = |name: &str| event.get(name).and_then(|v| v.as_bool()).unwrap_or(false);

    Ok(PeriodStatus::new(flag("finished"), flag("data_checked")))
}

fn parse_team_points(json: &serde_json::Value) -> Result<i64, ScoringError> {
    let history = json
        .get("entry_history")
        .ok_or_else(|| ScoringError::ParseError("Missing entry_history".to_string()))?;

    let points = history
        .get("points")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| ScoringError::ParseError("Missing points field".to_string()))?;
    let transfer_cost = history
        .get("event_transfers_cost")
        .and_then(|v| v.as_i64())
        .unwrap_or(0);

    Ok(points - transfer_cost)
}
