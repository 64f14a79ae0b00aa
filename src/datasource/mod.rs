//! Scoring feed abstraction for period status and live team points.

use crate::domain::{PeriodId, TeamId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;

pub mod fpl;
pub mod mock;

pub use fpl::FplScoringFeed;
pub use mock::MockScoringFeed;

/// Raw period flags as reported by the feed.
///
/// Totals can appear (`scoring_complete`) before bonus and adjustment points are
/// settled (`finalized`). Only both together mean the period is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PeriodStatus {
    pub scoring_complete: bool,
    pub finalized: bool,
}

impl PeriodStatus {
    pub fn new(scoring_complete: bool, finalized: bool) -> Self {
        Self {
            scoring_complete,
            finalized,
        }
    }

    /// True only once the feed reports the period both scored and finalized.
    pub fn is_complete(&self) -> bool {
        self.scoring_complete && self.finalized
    }
}

/// Scoring feed trait.
///
/// Implementations must handle retry/backoff and rate limiting.
#[async_trait]
pub trait ScoringFeed: Send + Sync + fmt::Debug {
    /// Fetch the completion flags for a scoring period.
    async fn period_status(&self, period_id: PeriodId) -> Result<PeriodStatus, ScoringError>;

    /// Fetch period points for a batch of teams.
    ///
    /// # Returns
    /// Points keyed by team id. Teams the feed has no data for are absent from
    /// the map; callers treat absence as "no new data", never as zero.
    async fn live_points(
        &self,
        period_id: PeriodId,
        team_ids: &[TeamId],
    ) -> Result<HashMap<TeamId, i64>, ScoringError>;
}

/// Error type for scoring feed operations.
#[derive(Debug, Clone)]
pub enum ScoringError {
    /// Network error (e.g., connection timeout, DNS failure)
    NetworkError(String),
    /// HTTP error (e.g., 5xx server error)
    HttpError { status: u16, message: String },
    /// Parsing error (invalid JSON or malformed response)
    ParseError(String),
    /// Rate limit exceeded
    RateLimited,
    /// The feed does not know the requested period
    UnknownPeriod(PeriodId),
    /// Other error
    Other(String),
}

impl fmt::Display for ScoringError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoringError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            ScoringError::HttpError { status, message } => {
                write!(f, "HTTP error {}: {}", status, message)
            }
            ScoringError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            ScoringError::RateLimited => write!(f, "Rate limited"),
            ScoringError::UnknownPeriod(id) => write!(f, "Unknown period: {}", id),
            ScoringError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for ScoringError {}
