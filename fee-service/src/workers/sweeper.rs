use crate::config::SweeperConfig;
use crate::error::FeeError;
use crate::models::{MaterializationState, MaterializationStatus};
use crate::services::fee_service::today;
use crate::services::FeeService;
use crate::workers::{JobScope, MaterializationJob};
use chrono::{Duration as ChronoDuration, Utc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Periodic housekeeping: marks installments due and re-queues
/// materialization jobs that never reached a worker.
pub struct DueSweeper {
    fees: FeeService,
    config: SweeperConfig,
    shutdown_token: CancellationToken,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub marked_due: u64,
    pub requeued: usize,
}

impl DueSweeper {
    pub fn new(fees: FeeService, config: SweeperConfig) -> Self {
        Self {
            fees,
            config,
            shutdown_token: CancellationToken::new(),
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub async fn run_once(&self) -> Result<SweepReport, FeeError> {
        let marked_due = self.fees.sweep_due_installments(None, today()).await?;
        let requeued = self.requeue_stale().await?;
        Ok(SweepReport {
            marked_due,
            requeued,
        })
    }

    /// `Pending` structures whose state has not moved for
    /// `stale_after_secs` lost their job to a full queue or a restart.
    async fn requeue_stale(&self) -> Result<usize, FeeError> {
        let cutoff = Utc::now() - ChronoDuration::seconds(self.config.stale_after_secs);
        let stale = self
            .fees
            .store
            .list_structures_by_materialization(&[MaterializationStatus::Pending])
            .await?
            .into_iter()
            .filter(|s| s.materialization.updated_at < cutoff);

        let mut requeued = 0;
        for structure in stale {
            let job = MaterializationJob::new(&structure.school_id, &structure.id, JobScope::Full);
            let mut state = MaterializationState::pending(job.job_id.clone());
            state.attempts = structure.materialization.attempts;
            let claimed = self
                .fees
                .store
                .set_materialization(
                    &structure.id,
                    structure.materialization.job_id.as_deref(),
                    &state,
                )
                .await?;
            if !claimed {
                continue;
            }
            tracing::warn!(
                school_id = %structure.school_id,
                structure_id = %structure.id,
                job_id = %job.job_id,
                "Re-queuing stale materialization job"
            );
            if self.fees.jobs.submit(job) {
                requeued += 1;
            }
        }
        Ok(requeued)
    }

    pub fn start(self) {
        if !self.config.enabled {
            tracing::info!("Due sweeper disabled by configuration");
            return;
        }
        tracing::info!(interval_secs = self.config.interval_secs, "Starting due sweeper");

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = self.shutdown_token.cancelled() => {
                        tracing::info!("Due sweeper shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        match self.run_once().await {
                            Ok(report) => tracing::debug!(
                                marked_due = report.marked_due,
                                requeued = report.requeued,
                                "Sweep pass complete"
                            ),
                            Err(e) => tracing::error!(error = %e, "Sweep pass failed"),
                        }
                    }
                }
            }
        });
    }
}
