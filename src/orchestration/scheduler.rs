//! Activation and update scheduler.
//!
//! One run activates leagues whose start time has passed, then reconciles
//! every active league in bounded batches. A failure in one league never
//! stops the others; it is recorded in the run's report.

use super::reconciler::{LeagueOutcome, LeagueReconciler};
use crate::db::Repository;
use crate::domain::{LeagueId, LeagueStatus, TimeMs};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub batch_size: usize,
    pub concurrency: usize,
    pub league_timeout: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            batch_size: 25,
            concurrency: 4,
            league_timeout: Duration::from_secs(30),
        }
    }
}

/// A league that could not be processed in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeagueFailure {
    /// `None` when the run itself failed before reaching any league.
    pub league_id: Option<LeagueId>,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
    pub activated_count: usize,
    pub processed_count: usize,
    pub completed_count: usize,
    pub entries_updated: usize,
    pub ranks_updated: usize,
    pub winnings_credited: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub settlement_digests: Vec<LeagueDigest>,
    pub errors: Vec<LeagueFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeagueDigest {
    pub league_id: LeagueId,
    pub digest: String,
}

impl ReconciliationReport {
    fn absorb(&mut self, outcome: LeagueOutcome) {
        self.processed_count += 1;
        self.entries_updated += outcome.entries_updated;
        self.ranks_updated += outcome.ranks_updated;
        self.winnings_credited += outcome.winnings_credited;
        if outcome.finalized {
            self.completed_count += 1;
        }
        if let Some(digest) = outcome.settlement_digest {
            self.settlement_digests.push(LeagueDigest {
                league_id: outcome.league_id,
                digest,
            });
        }
    }

    fn fail(&mut self, league_id: Option<LeagueId>, message: impl Into<String>) {
        self.errors.push(LeagueFailure {
            league_id,
            message: message.into(),
        });
    }
}

#[derive(Clone)]
pub struct Scheduler {
    reconciler: Arc<LeagueReconciler>,
    repo: Arc<Repository>,
    settings: SchedulerSettings,
}

impl Scheduler {
    pub fn new(
        reconciler: Arc<LeagueReconciler>,
        repo: Arc<Repository>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            reconciler,
            repo,
            settings: SchedulerSettings {
                batch_size: settings.batch_size.max(1),
                concurrency: settings.concurrency.max(1),
                league_timeout: settings.league_timeout,
            },
        }
    }

    /// Activate due leagues, then reconcile every active league.
    ///
    /// Overlapping runs are safe: every write underneath is idempotent.
    pub async fn run_reconciliation(&self, now: TimeMs) -> ReconciliationReport {
        let mut report = ReconciliationReport::default();
        self.activate_due(now, &mut report).await;

        let active = match self.repo.list_leagues_by_status(LeagueStatus::Active).await {
            Ok(leagues) => leagues,
            Err(e) => {
                warn!(error = %e, "Failed to list active leagues");
                report.fail(None, format!("listing active leagues: {}", e));
                return report;
            }
        };

        let ids: Vec<LeagueId> = active.iter().map(|l| l.id).collect();
        for batch in ids.chunks(self.settings.batch_size) {
            debug!(leagues = batch.len(), "Reconciling batch");
            let results: Vec<_> = stream::iter(batch.iter().copied())
                .map(|league_id| async move {
                    let result = tokio::time::timeout(
                        self.settings.league_timeout,
                        self.reconciler.reconcile(league_id),
                    )
                    .await;
                    (league_id, result)
                })
                .buffer_unordered(self.settings.concurrency)
                .collect()
                .await;

            for (league_id, result) in results {
                self.record(&mut report, league_id, result);
            }
        }

        report.errors.sort_by_key(|f| f.league_id);
        report.settlement_digests.sort_by_key(|d| d.league_id);

        info!(
            activated = report.activated_count,
            processed = report.processed_count,
            completed = report.completed_count,
            entries_updated = report.entries_updated,
            failures = report.errors.len(),
            "Reconciliation run finished"
        );
        report
    }

    /// Re-run settlement for one completed league.
    pub async fn refinalize(&self, league_id: LeagueId) -> ReconciliationReport {
        let mut report = ReconciliationReport::default();
        let result = tokio::time::timeout(
            self.settings.league_timeout,
            self.reconciler.refinalize(league_id),
        )
        .await;
        self.record(&mut report, league_id, result);
        report
    }

    /// Run `run_reconciliation` on a fixed interval until the task is aborted.
    pub fn spawn_periodic(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let report = self.run_reconciliation(TimeMs::now()).await;
                for failure in &report.errors {
                    warn!(
                        league_id = ?failure.league_id,
                        error = %failure.message,
                        "League reconciliation failed"
                    );
                }
            }
        })
    }

    async fn activate_due(&self, now: TimeMs, report: &mut ReconciliationReport) {
        let due = match self.repo.list_leagues_due_for_activation(now).await {
            Ok(due) => due,
            Err(e) => {
                warn!(error = %e, "Failed to list leagues due for activation");
                report.fail(None, format!("listing due leagues: {}", e));
                return;
            }
        };

        for league in due {
            match self.repo.activate_league(league.id).await {
                Ok(true) => {
                    info!(league_id = %league.id, "League activated");
                    report.activated_count += 1;
                }
                // Activated by a concurrent run.
                Ok(false) => {}
                Err(e) => {
                    warn!(league_id = %league.id, error = %e, "League activation failed");
                    report.fail(Some(league.id), format!("activation: {}", e));
                }
            }
        }
    }

    fn record(
        &self,
        report: &mut ReconciliationReport,
        league_id: LeagueId,
        result: Result<
            Result<LeagueOutcome, super::reconciler::ReconcileError>,
            tokio::time::error::Elapsed,
        >,
    ) {
        match result {
            Ok(Ok(outcome)) => report.absorb(outcome),
            Ok(Err(e)) => {
                warn!(league_id = %league_id, error = %e, "League reconciliation failed");
                report.fail(Some(league_id), e.to_string());
            }
            Err(_) => {
                warn!(league_id = %league_id, "League reconciliation timed out");
                report.fail(
                    Some(league_id),
                    format!(
                        "timed out after {}ms",
                        self.settings.league_timeout.as_millis()
                    ),
                );
            }
        }
    }
}
