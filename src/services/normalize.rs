//! Normalization of merged per-point rows into warehouse records.

use crate::db::models::ForecastRecord;
use crate::services::extractor::MergedRow;
use crate::services::links::DownloadTask;

/// Warehouse column order, shared by the loader's INSERT statement.
pub const WAREHOUSE_COLUMNS: [&str; 11] = [
    "issuance_time",
    "valid_time",
    "latitude",
    "longitude",
    "member",
    "u10",
    "v10",
    "tp",
    "tcc",
    "t2m",
    "prmsl",
];

/// Rewrap a [0, 360) longitude to signed form: values above 180 lose 360.
pub fn wrap_longitude(longitude: f64) -> f64 {
    if longitude > 180.0 {
        longitude - 360.0
    } else {
        longitude
    }
}

/// Project merged rows onto the warehouse schema.
///
/// Grouping keys from the merge are dropped; the task supplies issuance and
/// valid time.
pub fn normalize(task: &DownloadTask, rows: Vec<MergedRow>) -> Vec<ForecastRecord> {
    rows.into_iter()
        .map(|row| ForecastRecord {
            issuance_time: task.issuance_time,
            valid_time: task.valid_time,
            latitude: f64::from(row.point.latitude),
            longitude: wrap_longitude(f64::from(row.point.longitude)),
            member: row.member,
            u10: row.u10,
            v10: row.v10,
            tp: row.tp,
            tcc: row.tcc,
            t2m: row.t2m,
            prmsl: row.prmsl,
        })
        .collect()
}
