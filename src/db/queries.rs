use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};

use super::models::ForecastRecord;
use crate::services::normalize::WAREHOUSE_COLUMNS;

/// Rows per INSERT statement. Each row binds 11 parameters and Postgres caps a
/// statement at 65535.
const INSERT_CHUNK_ROWS: usize = 5000;

// ---------------------------------------------------------------------------
// Warehouse
// ---------------------------------------------------------------------------

/// Latest issuance stored in the warehouse, `None` when it is empty.
pub async fn get_max_issuance_time(pool: &PgPool) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
    sqlx::query_scalar::<_, Option<DateTime<Utc>>>("SELECT MAX(issuance_time) FROM gefs")
        .fetch_one(pool)
        .await
}

/// Distinct (issuance_time, valid_time, member) present from `since` onwards
/// for any of `members`.
pub async fn get_present_cells(
    pool: &PgPool,
    since: DateTime<Utc>,
    members: &[i32],
) -> Result<Vec<(DateTime<Utc>, DateTime<Utc>, i32)>, sqlx::Error> {
    sqlx::query_as::<_, (DateTime<Utc>, DateTime<Utc>, i32)>(
        "SELECT DISTINCT issuance_time, valid_time, member
         FROM gefs
         WHERE issuance_time >= $1 AND member = ANY($2)",
    )
    .bind(since)
    .bind(members)
    .fetch_all(pool)
    .await
}

/// Append records in one transaction. Any failed chunk rolls back the whole
/// batch. Returns the number of rows inserted.
pub async fn insert_forecast_batch(
    pool: &PgPool,
    records: &[ForecastRecord],
) -> Result<u64, sqlx::Error> {
    if records.is_empty() {
        return Ok(0);
    }

    let mut tx = pool.begin().await?;
    let mut inserted = 0u64;

    for chunk in records.chunks(INSERT_CHUNK_ROWS) {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("INSERT INTO gefs ({}) ", WAREHOUSE_COLUMNS.join(", ")));
        builder.push_values(chunk, |mut row, r| {
            row.push_bind(r.issuance_time)
                .push_bind(r.valid_time)
                .push_bind(r.latitude)
                .push_bind(r.longitude)
                .push_bind(r.member)
                .push_bind(r.u10)
                .push_bind(r.v10)
                .push_bind(r.tp)
                .push_bind(r.tcc)
                .push_bind(r.t2m)
                .push_bind(r.prmsl);
        });
        inserted += builder.build().execute(&mut *tx).await?.rows_affected();
    }

    tx.commit().await?;
    Ok(inserted)
}

/// Warehouse rows of one issuance and member whose coordinates fall on the
/// given latitude and longitude sets, ordered by valid time.
pub async fn get_cell_forecasts(
    pool: &PgPool,
    issuance_time: DateTime<Utc>,
    member: i32,
    latitudes: &[f64],
    longitudes: &[f64],
) -> Result<Vec<ForecastRecord>, sqlx::Error> {
    sqlx::query_as::<_, ForecastRecord>(
        "SELECT issuance_time, valid_time, latitude, longitude, member,
                u10, v10, tp, tcc, t2m, prmsl
         FROM gefs
         WHERE issuance_time = $1
           AND member = $2
           AND latitude = ANY($3)
           AND longitude = ANY($4)
         ORDER BY valid_time, latitude, longitude",
    )
    .bind(issuance_time)
    .bind(member)
    .bind(latitudes)
    .bind(longitudes)
    .fetch_all(pool)
    .await
}

// ---------------------------------------------------------------------------
// Favourites
// ---------------------------------------------------------------------------

/// Insert-if-absent. Returns whether a row was added.
pub async fn add_favourite(
    pool: &PgPool,
    user_id: &str,
    location_id: i32,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO favourites (user_id, location_id) VALUES ($1, $2)
         ON CONFLICT (user_id, location_id) DO NOTHING",
    )
    .bind(user_id)
    .bind(location_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Returns whether a row was removed.
pub async fn remove_favourite(
    pool: &PgPool,
    user_id: &str,
    location_id: i32,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM favourites WHERE user_id = $1 AND location_id = $2")
        .bind(user_id)
        .bind(location_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn list_favourites(pool: &PgPool, user_id: &str) -> Result<Vec<i32>, sqlx::Error> {
    sqlx::query_scalar::<_, i32>(
        "SELECT location_id FROM favourites WHERE user_id = $1 ORDER BY location_id",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}
