//! Bulk append of one run's records.

use sqlx::PgPool;

use crate::db::models::ForecastRecord;
use crate::db::queries;

/// Concatenate per-task batches, preserving task order.
pub fn concat_batches(batches: Vec<Vec<ForecastRecord>>) -> Vec<ForecastRecord> {
    let total = batches.iter().map(Vec::len).sum();
    let mut records = Vec::with_capacity(total);
    for batch in batches {
        records.extend(batch);
    }
    records
}

/// Write all batches in a single transaction.
///
/// An empty run writes nothing and reports zero rows. A write failure is
/// returned as-is: the run is aborted and the next run finds the same gaps.
pub async fn load(pool: &PgPool, batches: Vec<Vec<ForecastRecord>>) -> Result<u64, sqlx::Error> {
    let records = concat_batches(batches);
    if records.is_empty() {
        tracing::info!("No records to load");
        return Ok(0);
    }

    let inserted = queries::insert_forecast_batch(pool, &records).await?;
    tracing::info!("Loaded {} rows into the warehouse", inserted);
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(member: i32) -> ForecastRecord {
        ForecastRecord {
            issuance_time: "2024-05-26T00:00:00Z".parse().unwrap(),
            valid_time: "2024-05-26T12:00:00Z".parse().unwrap(),
            latitude: 50.0,
            longitude: 5.0,
            member,
            u10: None,
            v10: None,
            tp: None,
            tcc: None,
            t2m: Some(285.0),
            prmsl: None,
        }
    }

    #[test]
    fn test_concat_preserves_task_order() {
        let records = concat_batches(vec![
            vec![record(-1), record(-1)],
            vec![],
            vec![record(0)],
        ]);
        assert_eq!(
            records.iter().map(|r| r.member).collect::<Vec<_>>(),
            vec![-1, -1, 0]
        );
    }

    #[test]
    fn test_concat_of_nothing_is_empty() {
        assert!(concat_batches(Vec::new()).is_empty());
    }
}
