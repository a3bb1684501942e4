use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// One warehouse row of the `gefs` table.
///
/// Unique on (issuance_time, valid_time, member, latitude, longitude).
/// Measurement columns are nullable: precipitation and cloud cover do not
/// exist at lead hour zero, and a source file may lack any field.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct ForecastRecord {
    pub issuance_time: DateTime<Utc>,
    pub valid_time: DateTime<Utc>,
    pub latitude: f64,
    /// Signed longitude in [-180, 180).
    pub longitude: f64,
    /// -1 ensemble mean, 0 control, 1..N perturbed members.
    pub member: i32,
    /// 10 m u-wind (m/s)
    pub u10: Option<f64>,
    /// 10 m v-wind (m/s)
    pub v10: Option<f64>,
    /// Total precipitation (kg/m², i.e. mm)
    pub tp: Option<f64>,
    /// Total cloud cover (%)
    pub tcc: Option<f64>,
    /// 2 m temperature (K)
    pub t2m: Option<f64>,
    /// Pressure reduced to mean sea level (Pa)
    pub prmsl: Option<f64>,
}
