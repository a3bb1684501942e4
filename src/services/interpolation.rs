//! Point forecasts from the 1° warehouse grid.
//!
//! A query coordinate is bracketed by the integer lattice nodes around it
//! (up to four, one when it sits exactly on a node). Each node gets the weight
//! `2 − (Δlat² + Δlon²)`, normalized per (issuance_time, valid_time), and the
//! measurements are combined as weighted sums.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use utoipa::ToSchema;

use crate::db::models::ForecastRecord;
use crate::db::queries;
use crate::services::gaps::COVERAGE_MEMBER;
use crate::services::normalize::wrap_longitude;

const KELVIN_OFFSET: f64 = 273.15;
const PASCALS_PER_HECTOPASCAL: f64 = 100.0;

/// How wind is derived from the u/v components.
///
/// `Literal` reproduces the dashboard's historical `(u² + v²) / 2`;
/// `Magnitude` is the physical speed `sqrt(u² + v²)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WindFormula {
    #[default]
    Literal,
    Magnitude,
}

impl WindFormula {
    pub fn apply(self, u: f64, v: f64) -> f64 {
        let squared = u * u + v * v;
        match self {
            WindFormula::Literal => squared / 2.0,
            WindFormula::Magnitude => squared.sqrt(),
        }
    }
}

impl FromStr for WindFormula {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "literal" => Ok(WindFormula::Literal),
            "magnitude" => Ok(WindFormula::Magnitude),
            other => Err(format!("unknown wind formula '{}'", other)),
        }
    }
}

/// Weighted aggregate for one valid time, already in display units.
#[derive(Debug, Clone, PartialEq)]
pub struct InterpolatedRow {
    pub issuance_time: DateTime<Utc>,
    pub valid_time: DateTime<Utc>,
    /// `dd/mm` of the valid time.
    pub label: String,
    /// Total cloud cover (%)
    pub cloud_cover_pct: Option<f64>,
    /// 2 m temperature (°C)
    pub temperature_c: Option<f64>,
    /// Precipitation (mm)
    pub precipitation_mm: Option<f64>,
    pub wind: Option<f64>,
    /// Mean sea level pressure (hPa)
    pub pressure_hpa: Option<f64>,
}

/// Integer nodes bracketing a coordinate: floor and ceil, one value when the
/// coordinate is already integral.
pub fn bracket(coordinate: f64) -> Vec<i32> {
    let lower = coordinate.floor() as i32;
    let upper = coordinate.ceil() as i32;
    if lower == upper {
        vec![lower]
    } else {
        vec![lower, upper]
    }
}

/// Unnormalized weight of a node relative to the query coordinate.
pub fn raw_weight(node_lat: f64, node_lon: f64, latitude: f64, longitude: f64) -> f64 {
    let d_lat = node_lat - latitude;
    let d_lon = node_lon - longitude;
    2.0 - (d_lat * d_lat + d_lon * d_lon)
}

/// Normalized weights for a group of records, in input order.
///
/// Returns `None` when the weights cannot be normalized.
pub fn normalized_weights(
    records: &[&ForecastRecord],
    latitude: f64,
    longitude: f64,
) -> Option<Vec<f64>> {
    let raw: Vec<f64> = records
        .iter()
        .map(|r| raw_weight(r.latitude, r.longitude, latitude, longitude))
        .collect();
    let norm: f64 = raw.iter().sum();
    if !norm.is_finite() || norm.abs() < f64::EPSILON {
        return None;
    }
    Some(raw.into_iter().map(|w| w / norm).collect())
}

/// Weighted sum over the values that are present; `None` when none are.
fn weighted_sum<F>(records: &[&ForecastRecord], weights: &[f64], value: F) -> Option<f64>
where
    F: Fn(&ForecastRecord) -> Option<f64>,
{
    records
        .iter()
        .zip(weights)
        .filter_map(|(r, w)| value(r).map(|v| v * w))
        .fold(None, |acc, x| Some(acc.unwrap_or(0.0) + x))
}

/// Aggregate bracketing records into one row per (issuance_time, valid_time),
/// ordered by valid time. No records means no rows.
///
/// `longitude` must use the warehouse's signed convention.
pub fn interpolate(
    records: &[ForecastRecord],
    latitude: f64,
    longitude: f64,
    wind_formula: WindFormula,
) -> Vec<InterpolatedRow> {
    let mut groups: BTreeMap<(DateTime<Utc>, DateTime<Utc>), Vec<&ForecastRecord>> =
        BTreeMap::new();
    for record in records {
        groups
            .entry((record.issuance_time, record.valid_time))
            .or_default()
            .push(record);
    }

    let mut rows = Vec::with_capacity(groups.len());
    for ((issuance_time, valid_time), group) in groups {
        let Some(weights) = normalized_weights(&group, latitude, longitude) else {
            tracing::warn!(
                "Skipping {} / {}: weights do not normalize",
                issuance_time,
                valid_time
            );
            continue;
        };

        let u10 = weighted_sum(&group, &weights, |r| r.u10);
        let v10 = weighted_sum(&group, &weights, |r| r.v10);
        let wind = match (u10, v10) {
            (Some(u), Some(v)) => Some(wind_formula.apply(u, v)),
            _ => None,
        };

        rows.push(InterpolatedRow {
            issuance_time,
            valid_time,
            label: valid_time.format("%d/%m").to_string(),
            cloud_cover_pct: weighted_sum(&group, &weights, |r| r.tcc),
            temperature_c: weighted_sum(&group, &weights, |r| r.t2m).map(kelvin_to_celsius),
            precipitation_mm: weighted_sum(&group, &weights, |r| r.tp),
            wind,
            pressure_hpa: weighted_sum(&group, &weights, |r| r.prmsl).map(pascal_to_hectopascal),
        });
    }
    rows
}

pub fn kelvin_to_celsius(kelvin: f64) -> f64 {
    kelvin - KELVIN_OFFSET
}

pub fn pascal_to_hectopascal(pascal: f64) -> f64 {
    pascal / PASCALS_PER_HECTOPASCAL
}

/// Grid cell bracketing a query point, in warehouse coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct BracketCell {
    pub latitude: f64,
    /// Query longitude rewrapped to [-180, 180].
    pub longitude: f64,
    pub latitudes: Vec<i32>,
    pub longitudes: Vec<i32>,
}

impl BracketCell {
    pub fn around(latitude: f64, longitude: f64) -> Self {
        let longitude = wrap_longitude(longitude);
        Self {
            latitude,
            longitude,
            latitudes: bracket(latitude),
            longitudes: bracket(longitude),
        }
    }

    fn latitudes_f64(&self) -> Vec<f64> {
        self.latitudes.iter().map(|&v| f64::from(v)).collect()
    }

    fn longitudes_f64(&self) -> Vec<f64> {
        self.longitudes.iter().map(|&v| f64::from(v)).collect()
    }
}

/// Ensemble-mean warehouse rows of the cell around a point.
pub async fn fetch_cell(
    pool: &PgPool,
    cell: &BracketCell,
    issuance_time: DateTime<Utc>,
) -> Result<Vec<ForecastRecord>, sqlx::Error> {
    queries::get_cell_forecasts(
        pool,
        issuance_time,
        COVERAGE_MEMBER,
        &cell.latitudes_f64(),
        &cell.longitudes_f64(),
    )
    .await
}

/// Interpolated series for a point and issuance.
pub async fn forecast_for_point(
    pool: &PgPool,
    latitude: f64,
    longitude: f64,
    issuance_time: DateTime<Utc>,
    wind_formula: WindFormula,
) -> Result<Vec<InterpolatedRow>, sqlx::Error> {
    let cell = BracketCell::around(latitude, longitude);
    let records = fetch_cell(pool, &cell, issuance_time).await?;

    tracing::debug!(
        "Interpolating ({}, {}) for {} from {} rows",
        cell.latitude,
        cell.longitude,
        issuance_time,
        records.len()
    );

    Ok(interpolate(&records, cell.latitude, cell.longitude, wind_formula))
}
