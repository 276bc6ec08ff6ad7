use crate::config::WorkerConfig;
use crate::engine::{compile, compile_delta, CompileContext};
use crate::error::FeeError;
use crate::models::{MaterializationState, MaterializationStatus, RosterEntry};
use crate::services::metrics;
use crate::services::store::{FeeStore, InsertOutcome};
use backoff::future::retry;
use backoff::ExponentialBackoff;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobScope {
    /// Every row for every rostered student.
    Full,
    /// Added rows for the existing roster plus every row for added students.
    Delta {
        row_ids: Vec<String>,
        student_ids: Vec<String>,
    },
}

impl JobScope {
    fn as_str(&self) -> &'static str {
        match self {
            JobScope::Full => "full",
            JobScope::Delta { .. } => "delta",
        }
    }
}

#[derive(Debug, Clone)]
pub struct MaterializationJob {
    pub job_id: String,
    pub school_id: String,
    pub structure_id: String,
    pub scope: JobScope,
}

impl MaterializationJob {
    pub fn new(school_id: &str, structure_id: &str, scope: JobScope) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            school_id: school_id.to_string(),
            structure_id: structure_id.to_string(),
            scope,
        }
    }
}

/// Sending half of the job queue.
#[derive(Clone)]
pub struct MaterializationQueue {
    job_tx: mpsc::Sender<MaterializationJob>,
}

impl MaterializationQueue {
    /// Queues a job without waiting. A rejected job is not lost: its
    /// structure stays `Pending` and the recovery sweep picks it up.
    pub fn submit(&self, job: MaterializationJob) -> bool {
        match self.job_tx.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(job)) => {
                tracing::warn!(
                    structure_id = %job.structure_id,
                    job_id = %job.job_id,
                    "Materialization queue full; job left pending"
                );
                false
            }
            Err(TrySendError::Closed(job)) => {
                tracing::warn!(
                    structure_id = %job.structure_id,
                    job_id = %job.job_id,
                    "Materialization workers not running; job left pending"
                );
                false
            }
        }
    }
}

pub struct WorkerOrchestrator {
    config: WorkerConfig,
    store: Arc<dyn FeeStore>,
    job_rx: Option<mpsc::Receiver<MaterializationJob>>,
    shutdown_token: CancellationToken,
}

impl WorkerOrchestrator {
    pub fn new(config: WorkerConfig, store: Arc<dyn FeeStore>) -> (Self, MaterializationQueue) {
        let (job_tx, job_rx) = mpsc::channel(config.queue_size.max(1));

        let orchestrator = Self {
            config,
            store,
            job_rx: Some(job_rx),
            shutdown_token: CancellationToken::new(),
        };

        (orchestrator, MaterializationQueue { job_tx })
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn start(mut self) {
        if !self.config.enabled {
            tracing::info!("Materialization workers disabled by configuration");
            return;
        }
        let Some(mut job_rx) = self.job_rx.take() else {
            return;
        };

        let worker_count = self.config.worker_count.max(1);
        tracing::info!(worker_count, "Starting materialization workers");

        let materializer = Arc::new(Materializer::new(
            self.store.clone(),
            self.config.retry_max_elapsed(),
        ));
        let workers: Vec<Worker> = (0..worker_count)
            .map(|id| Worker {
                id,
                materializer: materializer.clone(),
            })
            .collect();

        let shutdown = self.shutdown_token.clone();
        let permits = Arc::new(Semaphore::new(worker_count));

        tokio::spawn(async move {
            let mut next_worker = 0;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::info!("Job distributor shutting down");
                        break;
                    }
                    job = job_rx.recv() => {
                        match job {
                            Some(job) => {
                                // at most worker_count jobs in flight
                                let permit = tokio::select! {
                                    _ = shutdown.cancelled() => {
                                        tracing::info!("Job distributor shutting down");
                                        break;
                                    }
                                    permit = permits.clone().acquire_owned() => match permit {
                                        Ok(permit) => permit,
                                        Err(_) => break,
                                    },
                                };
                                let worker = workers[next_worker].clone();
                                next_worker = (next_worker + 1) % workers.len();

                                tracing::info!(
                                    worker_id = worker.id,
                                    structure_id = %job.structure_id,
                                    job_id = %job.job_id,
                                    "Dispatching materialization job"
                                );

                                tokio::spawn(async move {
                                    worker.process_job(job).await;
                                    drop(permit);
                                });
                            }
                            None => {
                                tracing::info!("Channel closed, job distributor exiting");
                                break;
                            }
                        }
                    }
                }
            }
        });
    }
}

#[derive(Clone)]
struct Worker {
    id: usize,
    materializer: Arc<Materializer>,
}

impl Worker {
    async fn process_job(&self, job: MaterializationJob) {
        if let Err(e) = self.materializer.run(&job).await {
            tracing::error!(
                worker_id = self.id,
                structure_id = %job.structure_id,
                job_id = %job.job_id,
                error = %e,
                "Materialization job failed"
            );
        }
    }
}

/// Writes a structure's installments and tracks the job on the structure.
pub struct Materializer {
    store: Arc<dyn FeeStore>,
    retry_max_elapsed: Duration,
}

impl Materializer {
    pub fn new(store: Arc<dyn FeeStore>, retry_max_elapsed: Duration) -> Self {
        Self {
            store,
            retry_max_elapsed,
        }
    }

    /// Runs one job to completion: `Running`, then `Succeeded` or `Failed`.
    ///
    /// State is only written while the structure still names this job. A
    /// superseded job still inserts its installments, which the dedup key
    /// makes safe, but leaves the newer job's state alone.
    pub async fn run(&self, job: &MaterializationJob) -> Result<InsertOutcome, FeeError> {
        let start = Instant::now();
        let structure = self
            .store
            .find_structure(&job.school_id, &job.structure_id)
            .await?
            .ok_or_else(|| FeeError::not_found("Fee structure", &job.structure_id))?;

        let mut state = MaterializationState {
            status: MaterializationStatus::Running,
            job_id: Some(job.job_id.clone()),
            attempts: structure.materialization.attempts + 1,
            installments_created: 0,
            duplicates_skipped: 0,
            last_error: None,
            updated_at: Utc::now(),
        };
        let tracked = self
            .store
            .set_materialization(&job.structure_id, Some(&job.job_id), &state)
            .await?;
        if !tracked {
            tracing::info!(
                structure_id = %job.structure_id,
                job_id = %job.job_id,
                "Materialization job superseded; state left to the newer job"
            );
        }

        tracing::info!(
            school_id = %job.school_id,
            structure_id = %job.structure_id,
            job_id = %job.job_id,
            scope = job.scope.as_str(),
            attempt = state.attempts,
            "Materialization started"
        );

        let backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(100),
            max_elapsed_time: Some(self.retry_max_elapsed),
            ..Default::default()
        };

        let result = retry(backoff, || async {
            self.attempt(job).await.map_err(|e| {
                if e.is_transient() {
                    tracing::warn!(
                        structure_id = %job.structure_id,
                        error = %e,
                        "Transient materialization error; retrying"
                    );
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })
        })
        .await;

        state.updated_at = Utc::now();
        match result {
            Ok(outcome) => {
                state.status = MaterializationStatus::Succeeded;
                state.installments_created = outcome.inserted as i64;
                state.duplicates_skipped = outcome.duplicates as i64;
                if tracked {
                    self.record(job, &state).await?;
                }

                metrics::record_materialization(
                    "succeeded",
                    outcome.inserted,
                    outcome.duplicates,
                    start.elapsed(),
                );
                tracing::info!(
                    structure_id = %job.structure_id,
                    job_id = %job.job_id,
                    inserted = outcome.inserted,
                    duplicates = outcome.duplicates,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Materialization succeeded"
                );
                Ok(outcome)
            }
            Err(e) => {
                state.status = MaterializationStatus::Failed;
                state.last_error = Some(e.to_string());
                if tracked {
                    if let Err(write_err) = self.record(job, &state).await {
                        tracing::error!(
                            structure_id = %job.structure_id,
                            error = %write_err,
                            "Failed to record materialization failure"
                        );
                    }
                }
                metrics::record_materialization("failed", 0, 0, start.elapsed());
                Err(e)
            }
        }
    }

    async fn record(
        &self,
        job: &MaterializationJob,
        state: &MaterializationState,
    ) -> Result<(), FeeError> {
        let applied = self
            .store
            .set_materialization(&job.structure_id, Some(&job.job_id), state)
            .await?;
        if !applied {
            tracing::info!(
                structure_id = %job.structure_id,
                job_id = %job.job_id,
                status = state.status.as_str(),
                "Materialization result not recorded; a newer job owns the structure"
            );
        }
        Ok(())
    }

    async fn attempt(&self, job: &MaterializationJob) -> Result<InsertOutcome, FeeError> {
        let structure = self
            .store
            .find_structure(&job.school_id, &job.structure_id)
            .await?
            .ok_or_else(|| FeeError::not_found("Fee structure", &job.structure_id))?;

        let ctx = CompileContext {
            school_id: &structure.school_id,
            academic_year_id: &structure.academic_year_id,
            fee_structure_id: &structure.id,
        };
        let drafts = match &job.scope {
            JobScope::Full => compile(&structure.fee_rows, &structure.roster, ctx),
            JobScope::Delta {
                row_ids,
                student_ids,
            } => {
                let new_students: Vec<RosterEntry> = structure
                    .roster
                    .iter()
                    .filter(|e| student_ids.contains(&e.student_id))
                    .cloned()
                    .collect();
                compile_delta(
                    &structure.fee_rows,
                    row_ids,
                    &structure.roster,
                    &new_students,
                    ctx,
                )
            }
        };

        if drafts.is_empty() {
            return Ok(InsertOutcome::default());
        }

        let now = Utc::now();
        let installments = drafts
            .into_iter()
            .map(|draft| draft.into_installment(now))
            .collect();
        self.store.insert_installments(installments).await
    }
}

/// Re-queues structures a previous process left `Pending` or `Running`.
pub async fn requeue_unfinished(
    store: &dyn FeeStore,
    queue: &MaterializationQueue,
) -> Result<usize, FeeError> {
    let structures = store
        .list_structures_by_materialization(&[
            MaterializationStatus::Pending,
            MaterializationStatus::Running,
        ])
        .await?;

    let mut queued = 0;
    for structure in structures {
        let job = MaterializationJob::new(&structure.school_id, &structure.id, JobScope::Full);
        let mut state = MaterializationState::pending(job.job_id.clone());
        state.attempts = structure.materialization.attempts;
        let claimed = store
            .set_materialization(
                &structure.id,
                structure.materialization.job_id.as_deref(),
                &state,
            )
            .await?;
        if claimed && queue.submit(job) {
            queued += 1;
        }
    }
    if queued > 0 {
        tracing::info!(queued, "Re-queued unfinished materialization jobs");
    }
    Ok(queued)
}
