//! Background GEFS ingester.
//!
//! One run detects the missing (issuance, valid_time, member) cells, turns each
//! into a download task, fetches and extracts the tasks on a bounded worker pool and
//! appends everything that succeeded in a single transaction.
//!
//! Architecture:
//! - Per-task failures (HTTP, decode, timeout) are logged with the task's
//!   tuple and skipped. Gap detection starts at the newest stored issuance, so
//!   a skipped task is proposed again only while its issuance is still that
//!   newest one; once a later issuance lands the hole stays
//! - A failed warehouse write aborts the run
//! - Runs repeat on a fixed interval; state is in-memory
//!   (`Arc<RwLock<IngesterState>>`) and exposed on the status endpoint

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::RwLock;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::IngestConfig;
use crate::db::models::ForecastRecord;
use crate::errors::AppError;
use crate::services::extractor::{extract_file, ExtractError};
use crate::services::gaps::detect_gaps;
use crate::services::gefs::GefsClient;
use crate::services::lattice::GridLattice;
use crate::services::links::{expand_tasks, DownloadTask};
use crate::services::loader;

// ---------------------------------------------------------------------------
// Ingester state (in-memory, shared via Arc<RwLock<>>)
// ---------------------------------------------------------------------------

/// A task that was skipped during a run.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TaskFailure {
    pub issuance_time: DateTime<Utc>,
    pub valid_time: DateTime<Utc>,
    pub member: i32,
    pub url: String,
    pub reason: String,
}

/// Summary of one ingestion run.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct IngestReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Missing (issuance, valid_time, member) cells found
    pub gaps: usize,
    /// Download tasks scheduled, one per gap
    pub tasks: usize,
    pub succeeded: usize,
    pub failed: Vec<TaskFailure>,
    pub rows_written: u64,
}

/// Global ingester state, exposed via the status endpoint.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct IngesterState {
    pub active: bool,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_completed_at: Option<DateTime<Utc>>,
    pub last_run_duration_ms: Option<u64>,
    pub total_runs: u64,
    pub last_report: Option<IngestReport>,
    /// Error of the last run, cleared by the next successful one
    pub last_error: Option<String>,
}

impl IngesterState {
    pub fn new(active: bool) -> Self {
        Self {
            active,
            next_run_at: None,
            last_run_completed_at: None,
            last_run_duration_ms: None,
            total_runs: 0,
            last_report: None,
            last_error: None,
        }
    }
}

/// Shared ingester state handle.
pub type SharedIngesterState = Arc<RwLock<IngesterState>>;

/// Everything a run needs, cloned into the background task.
#[derive(Debug, Clone)]
pub struct IngestContext {
    pub pool: PgPool,
    pub client: GefsClient,
    pub lattice: Arc<GridLattice>,
    pub config: IngestConfig,
}

// ---------------------------------------------------------------------------
// Worker pool
// ---------------------------------------------------------------------------

/// Result of one task, kept next to the task for reporting.
#[derive(Debug)]
pub struct TaskOutcome {
    pub task: DownloadTask,
    pub result: Result<Vec<ForecastRecord>, ExtractError>,
}

/// Download and extract one task under the per-task timeout.
///
/// The scratch file lives until extraction is done and is removed on drop,
/// whatever the outcome.
async fn process_task(
    client: &GefsClient,
    lattice: Arc<GridLattice>,
    scratch_dir: &Path,
    timeout: Duration,
    task: &DownloadTask,
) -> Result<Vec<ForecastRecord>, ExtractError> {
    let work = async {
        let file = client.download(task, scratch_dir).await?;
        let parse_task = task.clone();
        tokio::task::spawn_blocking(move || extract_file(file.path(), &parse_task, &lattice))
            .await
            .map_err(|e| ExtractError::Worker(e.to_string()))?
    };

    match tokio::time::timeout(timeout, work).await {
        Ok(result) => result,
        Err(_) => Err(ExtractError::Timeout(timeout.as_secs())),
    }
}

/// Run all tasks with at most `config.concurrency` in flight. Outcomes come
/// back in task order.
pub async fn execute_tasks(
    client: &GefsClient,
    lattice: Arc<GridLattice>,
    config: &IngestConfig,
    tasks: Vec<DownloadTask>,
) -> Vec<TaskOutcome> {
    stream::iter(tasks)
        .map(|task| {
            let lattice = lattice.clone();
            async move {
                let result = process_task(
                    client,
                    lattice,
                    &config.scratch_dir,
                    config.task_timeout,
                    &task,
                )
                .await;
                TaskOutcome { task, result }
            }
        })
        .buffered(config.concurrency.max(1))
        .collect()
        .await
}

/// Split outcomes into record batches and failures, logging each skip.
pub fn partition_outcomes(outcomes: Vec<TaskOutcome>) -> (Vec<Vec<ForecastRecord>>, Vec<TaskFailure>) {
    let mut batches = Vec::new();
    let mut failures = Vec::new();
    for outcome in outcomes {
        let task = outcome.task;
        match outcome.result {
            Ok(records) => batches.push(records),
            Err(e) => {
                tracing::warn!(
                    "Skipping issuance {} valid {} member {}: {}",
                    task.issuance_time,
                    task.valid_time,
                    task.member,
                    e
                );
                failures.push(TaskFailure {
                    issuance_time: task.issuance_time,
                    valid_time: task.valid_time,
                    member: task.member,
                    url: task.url,
                    reason: e.to_string(),
                });
            }
        }
    }
    (batches, failures)
}

// ---------------------------------------------------------------------------
// Single run
// ---------------------------------------------------------------------------

/// Run one ingestion pass as of `now`.
pub async fn run_ingestion(ctx: &IngestContext, now: DateTime<Utc>) -> Result<IngestReport, AppError> {
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();

    tokio::fs::create_dir_all(&ctx.config.scratch_dir)
        .await
        .map_err(|e| {
            AppError::InternalError(format!(
                "Scratch directory {} unavailable: {}",
                ctx.config.scratch_dir.display(),
                e
            ))
        })?;

    let gaps = detect_gaps(&ctx.pool, ctx.config.epoch, now, &ctx.config.members).await?;
    let tasks = expand_tasks(&ctx.config.base_url, &gaps);
    let task_count = tasks.len();

    tracing::info!(
        "Ingest run {}: {} gaps, {} tasks",
        run_id,
        gaps.len(),
        task_count
    );

    let outcomes = execute_tasks(&ctx.client, ctx.lattice.clone(), &ctx.config, tasks).await;
    let (batches, failed) = partition_outcomes(outcomes);
    let succeeded = batches.len();

    let rows_written = loader::load(&ctx.pool, batches).await?;

    Ok(IngestReport {
        run_id,
        started_at,
        finished_at: Utc::now(),
        gaps: gaps.len(),
        tasks: task_count,
        succeeded,
        failed,
        rows_written,
    })
}

// ---------------------------------------------------------------------------
// Main ingester loop
// ---------------------------------------------------------------------------

/// Run the background ingester. Never returns.
///
/// Should be spawned via `tokio::spawn(run_ingester(...))`.
pub async fn run_ingester(ctx: IngestContext, state: SharedIngesterState) {
    tracing::info!(
        "Background ingester started (interval {}s, concurrency {}, members {:?})",
        ctx.config.interval.as_secs(),
        ctx.config.concurrency,
        ctx.config.members
    );

    loop {
        let started = Instant::now();
        let result = run_ingestion(&ctx, Utc::now()).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        {
            let mut s = state.write().await;
            s.total_runs += 1;
            s.last_run_completed_at = Some(Utc::now());
            s.last_run_duration_ms = Some(duration_ms);
            s.next_run_at = chrono::Duration::from_std(ctx.config.interval)
                .ok()
                .map(|d| Utc::now() + d);
            match result {
                Ok(report) => {
                    tracing::info!(
                        "Ingest run {} complete in {}ms: {}/{} tasks succeeded, {} rows written",
                        report.run_id,
                        duration_ms,
                        report.succeeded,
                        report.tasks,
                        report.rows_written
                    );
                    s.last_report = Some(report);
                    s.last_error = None;
                }
                Err(e) => {
                    tracing::error!("Ingest run failed after {}ms: {}", duration_ms, e);
                    s.last_error = Some(e.to_string());
                }
            }
        }

        tokio::time::sleep(ctx.config.interval).await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse::<DateTime<Utc>>().unwrap()
    }

    fn task(base_url: &str, valid: &str, member: i32) -> DownloadTask {
        DownloadTask::new(base_url, ts("2024-05-26T00:00:00Z"), ts(valid), member)
    }

    fn config(scratch: &Path) -> IngestConfig {
        IngestConfig {
            concurrency: 2,
            task_timeout: Duration::from_secs(5),
            scratch_dir: scratch.to_path_buf(),
            ..IngestConfig::default()
        }
    }

    #[test]
    fn test_initial_state() {
        let state = IngesterState::new(true);
        assert!(state.active);
        assert_eq!(state.total_runs, 0);
        assert!(state.last_report.is_none());
        assert!(!IngesterState::new(false).active);
    }

    #[test]
    fn test_partition_outcomes() {
        let base = "https://example.test";
        let outcomes = vec![
            TaskOutcome {
                task: task(base, "2024-05-26T12:00:00Z", -1),
                result: Ok(Vec::new()),
            },
            TaskOutcome {
                task: task(base, "2024-05-27T12:00:00Z", -1),
                result: Err(ExtractError::HttpStatus(404)),
            },
            TaskOutcome {
                task: task(base, "2024-05-28T12:00:00Z", 0),
                result: Err(ExtractError::Timeout(600)),
            },
        ];
        let (batches, failures) = partition_outcomes(outcomes);
        assert_eq!(batches.len(), 1);
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].valid_time, ts("2024-05-27T12:00:00Z"));
        assert_eq!(failures[0].reason, "Provider returned HTTP 404");
        assert_eq!(failures[1].member, 0);
        assert!(failures[1].url.contains("gec00"));
    }

    #[tokio::test]
    async fn test_execute_tasks_isolates_failures_and_keeps_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"f012$"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"f036$"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"not a grib file".to_vec()))
            .mount(&server)
            .await;

        let scratch = tempfile::tempdir().unwrap();
        let tasks = vec![
            task(&server.uri(), "2024-05-26T12:00:00Z", -1),
            task(&server.uri(), "2024-05-27T12:00:00Z", -1),
        ];

        let outcomes = execute_tasks(
            &GefsClient::new(),
            Arc::new(GridLattice::europe()),
            &config(scratch.path()),
            tasks,
        )
        .await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].task.lead_hours(), 12);
        assert!(matches!(outcomes[0].result, Err(ExtractError::HttpStatus(404))));
        assert_eq!(outcomes[1].task.lead_hours(), 36);
        assert!(outcomes[1].result.is_err());

        // Scratch files are gone once their task has finished.
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_slow_task_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(vec![0u8; 16])
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let scratch = tempfile::tempdir().unwrap();
        let cfg = IngestConfig {
            task_timeout: Duration::from_millis(200),
            ..config(scratch.path())
        };

        let outcomes = execute_tasks(
            &GefsClient::new(),
            Arc::new(GridLattice::europe()),
            &cfg,
            vec![task(&server.uri(), "2024-05-26T12:00:00Z", -1)],
        )
        .await;

        assert!(matches!(outcomes[0].result, Err(ExtractError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_no_tasks_no_outcomes() {
        let scratch = tempfile::tempdir().unwrap();
        let outcomes = execute_tasks(
            &GefsClient::new(),
            Arc::new(GridLattice::europe()),
            &config(scratch.path()),
            Vec::new(),
        )
        .await;
        assert!(outcomes.is_empty());
    }
}
