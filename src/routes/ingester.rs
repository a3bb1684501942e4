//! Ingester status HTTP endpoint.
//!
//! GET /api/v1/ingester/status returns the state of the background GEFS
//! ingester as JSON:
//!
//! - `active`: false when ingestion is disabled by configuration
//! - `next_run_at`, `last_run_completed_at`, `last_run_duration_ms`, `total_runs`
//! - `last_report`: the newest finished run, absent before the first one. It
//!   carries `run_id`, start and finish times, `gaps` (missing
//!   issuance/valid_time/member cells), `tasks` (downloads scheduled, one per
//!   gap), `succeeded`, `failed` (issuance, valid time, member, URL and reason
//!   per skipped task) and `rows_written`
//! - `last_error`: why the newest run aborted (gap query or warehouse write),
//!   cleared by the next clean run

use axum::extract::State;
use axum::Json;

use crate::services::ingester::{IngesterState, SharedIngesterState};

/// Get the current ingester status and the last run report.
#[utoipa::path(
    get,
    path = "/api/v1/ingester/status",
    tag = "Ingester",
    responses(
        (status = 200, description = "Ingester state with the last run report and failed tasks", body = IngesterState),
    )
)]
pub async fn get_ingester_status(State(state): State<SharedIngesterState>) -> Json<IngesterState> {
    Json(state.read().await.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ingester::{IngestReport, TaskFailure};
    use std::sync::Arc;
    use tokio::sync::RwLock;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_status_exposes_failed_tasks() {
        let t = "2024-05-26T12:00:00Z".parse().unwrap();
        let mut state = IngesterState::new(true);
        state.total_runs = 1;
        state.last_report = Some(IngestReport {
            run_id: Uuid::new_v4(),
            started_at: t,
            finished_at: t,
            gaps: 2,
            tasks: 2,
            succeeded: 1,
            failed: vec![TaskFailure {
                issuance_time: t,
                valid_time: t,
                member: -1,
                url: "http://bucket/geavg.t12z.pgrb2a.0p50.f000".to_string(),
                reason: "HTTP status 404".to_string(),
            }],
            rows_written: 6466,
        });

        let Json(body) = get_ingester_status(State(Arc::new(RwLock::new(state)))).await;
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["active"], true);
        assert_eq!(json["last_report"]["gaps"], 2);
        assert_eq!(json["last_report"]["rows_written"], 6466);
        assert_eq!(json["last_report"]["failed"][0]["member"], -1);
        assert_eq!(json["last_report"]["failed"][0]["reason"], "HTTP status 404");
        assert!(json["last_error"].is_null());
    }
}
