//! Forecast HTTP endpoints.
//!
//! - GET /api/v1/forecasts?latitude=&longitude=&issuance_date=&issuance_hour=
//! - GET /api/v1/forecasts/cell?latitude=&longitude=&issuance_date=&issuance_hour=

use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::db::models::ForecastRecord;
use crate::errors::{AppError, ErrorResponse};
use crate::services::interpolation::{self, BracketCell, InterpolatedRow, WindFormula};
use crate::services::presentation::{display_row, select_icon, DisplayRow, WeatherIcon};

/// Hour from which today's runs are considered published on the dashboard.
const SAME_DAY_ISSUANCE_HOUR: u32 = 12;

/// Shared application state for forecast endpoints.
#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) pool: sqlx::PgPool,
    pub(crate) wind_formula: WindFormula,
}

// ---------------------------------------------------------------------------
// Query parameter structs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, IntoParams)]
pub struct ForecastQuery {
    /// Latitude in degrees, [-90, 90]
    pub latitude: f64,
    /// Longitude in degrees, [-180, 360)
    pub longitude: f64,
    /// Issuance date (YYYY-MM-DD). Defaults to today from 12:00 UTC, else yesterday.
    pub issuance_date: Option<NaiveDate>,
    /// Issuance hour, 0 or 12. Defaults to 0.
    pub issuance_hour: Option<u32>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// One interpolated valid time.
#[derive(Debug, Serialize, ToSchema)]
pub struct ForecastRow {
    /// Valid time in RFC 3339
    pub valid_time: String,
    /// Day label, `dd/mm`
    pub label: String,
    /// Total cloud cover (%)
    pub cloud_cover_pct: Option<f64>,
    /// 2 m temperature (°C)
    pub temperature_c: Option<f64>,
    /// Precipitation (mm)
    pub precipitation_mm: Option<f64>,
    /// Wind derived from the 10 m components (see `wind_formula`)
    pub wind: Option<f64>,
    /// Mean sea level pressure (hPa)
    pub pressure_hpa: Option<f64>,
    pub icon: Option<WeatherIcon>,
    pub display: DisplayRow,
}

impl From<InterpolatedRow> for ForecastRow {
    fn from(row: InterpolatedRow) -> Self {
        let icon = select_icon(row.cloud_cover_pct, row.precipitation_mm);
        let display = display_row(&row, icon);
        Self {
            valid_time: row.valid_time.to_rfc3339(),
            label: row.label,
            cloud_cover_pct: row.cloud_cover_pct,
            temperature_c: row.temperature_c,
            precipitation_mm: row.precipitation_mm,
            wind: row.wind,
            pressure_hpa: row.pressure_hpa,
            icon,
            display,
        }
    }
}

/// Interpolated point forecast for one issuance.
#[derive(Debug, Serialize, ToSchema)]
pub struct ForecastResponse {
    pub latitude: f64,
    /// Query longitude in signed form
    pub longitude: f64,
    /// Issuance in RFC 3339
    pub issuance_time: String,
    pub wind_formula: WindFormula,
    /// Lattice latitudes used for the interpolation
    pub grid_latitudes: Vec<i32>,
    /// Lattice longitudes used for the interpolation
    pub grid_longitudes: Vec<i32>,
    /// Empty when the issuance is not in the warehouse
    pub rows: Vec<ForecastRow>,
}

/// Raw warehouse row.
#[derive(Debug, Serialize, ToSchema)]
pub struct CellRecordResponse {
    pub issuance_time: String,
    pub valid_time: String,
    pub latitude: f64,
    pub longitude: f64,
    pub member: i32,
    pub u10: Option<f64>,
    pub v10: Option<f64>,
    pub tp: Option<f64>,
    pub tcc: Option<f64>,
    pub t2m: Option<f64>,
    pub prmsl: Option<f64>,
}

impl From<ForecastRecord> for CellRecordResponse {
    fn from(r: ForecastRecord) -> Self {
        Self {
            issuance_time: r.issuance_time.to_rfc3339(),
            valid_time: r.valid_time.to_rfc3339(),
            latitude: r.latitude,
            longitude: r.longitude,
            member: r.member,
            u10: r.u10,
            v10: r.v10,
            tp: r.tp,
            tcc: r.tcc,
            t2m: r.t2m,
            prmsl: r.prmsl,
        }
    }
}

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

fn validate_coordinates(latitude: f64, longitude: f64) -> Result<(), AppError> {
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(AppError::BadRequest(format!(
            "latitude must be within [-90, 90], got {}",
            latitude
        )));
    }
    if !longitude.is_finite() || !(-180.0..360.0).contains(&longitude) {
        return Err(AppError::BadRequest(format!(
            "longitude must be within [-180, 360), got {}",
            longitude
        )));
    }
    Ok(())
}

/// Issuance date shown by default: today once 12:00 UTC has passed,
/// otherwise yesterday.
pub fn default_issuance_date(now: DateTime<Utc>) -> NaiveDate {
    let today = now.date_naive();
    if now.hour() >= SAME_DAY_ISSUANCE_HOUR {
        today
    } else {
        today - Duration::days(1)
    }
}

/// Resolve the requested issuance time from the query.
fn resolve_issuance(query: &ForecastQuery, now: DateTime<Utc>) -> Result<DateTime<Utc>, AppError> {
    let hour = query.issuance_hour.unwrap_or(0);
    if hour != 0 && hour != 12 {
        return Err(AppError::BadRequest(format!(
            "issuance_hour must be 0 or 12, got {}",
            hour
        )));
    }
    let date = query.issuance_date.unwrap_or_else(|| default_issuance_date(now));
    date.and_hms_opt(hour, 0, 0)
        .map(|naive| naive.and_utc())
        .ok_or_else(|| AppError::BadRequest("Invalid issuance date".to_string()))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Interpolated forecast for a point.
///
/// Combines the ensemble-mean rows of the surrounding 1° cell, weighted by
/// distance. An issuance that is not in the warehouse yields an empty series.
#[utoipa::path(
    get,
    path = "/api/v1/forecasts",
    tag = "Forecasts",
    params(ForecastQuery),
    responses(
        (status = 200, description = "Interpolated forecast series", body = ForecastResponse),
        (status = 400, description = "Invalid coordinates or issuance", body = ErrorResponse),
    )
)]
pub async fn get_point_forecast(
    State(state): State<AppState>,
    Query(query): Query<ForecastQuery>,
) -> Result<Json<ForecastResponse>, AppError> {
    validate_coordinates(query.latitude, query.longitude)?;
    let issuance_time = resolve_issuance(&query, Utc::now())?;
    let cell = BracketCell::around(query.latitude, query.longitude);

    let rows = interpolation::forecast_for_point(
        &state.pool,
        query.latitude,
        query.longitude,
        issuance_time,
        state.wind_formula,
    )
    .await?;

    Ok(Json(ForecastResponse {
        latitude: cell.latitude,
        longitude: cell.longitude,
        issuance_time: issuance_time.to_rfc3339(),
        wind_formula: state.wind_formula,
        grid_latitudes: cell.latitudes,
        grid_longitudes: cell.longitudes,
        rows: rows.into_iter().map(ForecastRow::from).collect(),
    }))
}

/// Raw warehouse rows of the cell around a point.
#[utoipa::path(
    get,
    path = "/api/v1/forecasts/cell",
    tag = "Forecasts",
    params(ForecastQuery),
    responses(
        (status = 200, description = "Ensemble-mean rows of the bracketing cell", body = Vec<CellRecordResponse>),
        (status = 400, description = "Invalid coordinates or issuance", body = ErrorResponse),
    )
)]
pub async fn get_cell_forecast(
    State(state): State<AppState>,
    Query(query): Query<ForecastQuery>,
) -> Result<Json<Vec<CellRecordResponse>>, AppError> {
    validate_coordinates(query.latitude, query.longitude)?;
    let issuance_time = resolve_issuance(&query, Utc::now())?;
    let cell = BracketCell::around(query.latitude, query.longitude);

    let records = interpolation::fetch_cell(&state.pool, &cell, issuance_time).await?;
    Ok(Json(records.into_iter().map(CellRecordResponse::from).collect()))
}
