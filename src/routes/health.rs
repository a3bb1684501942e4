use axum::extract::State;
use axum::Json;
use serde::Serialize;
use sqlx::PgPool;
use utoipa::ToSchema;

use crate::db::queries;

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Service status ("ok" when healthy, "degraded" when DB is unreachable)
    pub status: String,
    /// API version
    pub version: String,
    /// Whether the database is reachable
    pub database: bool,
    /// Latest issuance in the warehouse (RFC 3339), absent when empty or unreachable
    pub latest_issuance_time: Option<String>,
}

/// Health check endpoint.
///
/// Reports the API version, database connectivity and how far the warehouse
/// has been filled. Returns status "degraded" (still 200) if the DB is
/// unreachable, so load balancers can distinguish partial failures.
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
    )
)]
pub async fn health_check(State(pool): State<PgPool>) -> Json<HealthResponse> {
    let latest = queries::get_max_issuance_time(&pool).await;
    let db_ok = latest.is_ok();
    if let Err(e) = &latest {
        tracing::warn!("Health check could not reach the database: {}", e);
    }

    Json(HealthResponse {
        status: if db_ok {
            "ok".to_string()
        } else {
            "degraded".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: db_ok,
        latest_issuance_time: latest.ok().flatten().map(|t| t.to_rfc3339()),
    })
}
