//! Mock scoring feed for testing without network calls.

use super::{PeriodStatus, ScoringError, ScoringFeed};
use crate::domain::{PeriodId, TeamId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

#[derive(Debug, Default)]
struct MockState {
    statuses: HashMap<PeriodId, PeriodStatus>,
    points: HashMap<(PeriodId, TeamId), i64>,
    failure: Option<ScoringError>,
}

/// Mock scoring feed returning predefined data.
///
/// Clones share state, so a test can keep a handle and change the feed between
/// reconciliation passes.
#[derive(Debug, Clone, Default)]
pub struct MockScoringFeed {
    state: Arc<RwLock<MockState>>,
    points_calls: Arc<AtomicUsize>,
}

impl MockScoringFeed {
    /// Create a new mock feed with no data.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the status flags for a period.
    pub fn with_status(self, period_id: PeriodId, status: PeriodStatus) -> Self {
        self.set_status(period_id, status);
        self
    }

    /// Set points for a team in a period.
    pub fn with_points(self, period_id: PeriodId, team_id: TeamId, points: i64) -> Self {
        self.set_points(period_id, team_id, points);
        self
    }

    pub fn set_status(&self, period_id: PeriodId, status: PeriodStatus) {
        if let Ok(mut state) = self.state.write() {
            state.statuses.insert(period_id, status);
        }
    }

    pub fn set_points(&self, period_id: PeriodId, team_id: TeamId, points: i64) {
        if let Ok(mut state) = self.state.write() {
            state.points.insert((period_id, team_id), points);
        }
    }

    /// Make every subsequent call fail with `error` (None restores normal behavior).
    pub fn set_failure(&self, error: Option<ScoringError>) {
        if let Ok(mut state) = self.state.write() {
            state.failure = error;
        }
    }

    /// Number of `live_points` calls served so far.
    pub fn points_calls(&self) -> usize {
        self.points_calls.load(Ordering::SeqCst)
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, MockState>, ScoringError> {
        let state = self
            .state
            .read()
            .map_err(|_| ScoringError::Other("mock state poisoned".to_string()))?;
        if let Some(err) = &state.failure {
            return Err(err.clone());
        }
        Ok(state)
    }
}

#[async_trait]
impl ScoringFeed for MockScoringFeed {
    async fn period_status(&self, period_id: PeriodId) -> Result<PeriodStatus, ScoringError> {
        let state = self.read()?;
        Ok(state.statuses.get(&period_id).copied().unwrap_or_default())
    }

    async fn live_points(
        &self,
        period_id: PeriodId,
        team_ids: &[TeamId],
    ) -> Result<HashMap<TeamId, i64>, ScoringError> {
        self.points_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.read()?;
        Ok(team_ids
            .iter()
            .filter_map(|team| {
                state
                    .points
                    .get(&(period_id, *team))
                    .map(|points| (*team, *points))
            })
            .collect())
    }
}
