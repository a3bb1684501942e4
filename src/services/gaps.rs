//! Gap detection: which (issuance, valid_time, member) cells are missing from
//! the warehouse.
//!
//! There is no persisted cursor. Each run re-reads the latest stored issuance
//! and the cells already present for it, rebuilds the expected lattice of cells
//! from there up to "now", and takes the difference.
//!
//! Coverage is tracked per configured member. A (issuance, valid_time) pair is
//! expected once for every member, so a member whose rows already landed is
//! never requested again while another member of the same pair is missing.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Timelike, Utc};
use sqlx::PgPool;

use crate::db::queries;

/// Spacing between model issuances.
const CADENCE_HOURS: i64 = 12;

/// Ensemble mean; the default and only member unless more are configured.
pub const COVERAGE_MEMBER: i32 = -1;

/// One (issuance, valid_time, member) combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cell {
    pub issuance_time: DateTime<Utc>,
    pub valid_time: DateTime<Utc>,
    pub member: i32,
}

/// Truncate to the start of the hour.
fn floor_to_hour(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.with_minute(0)
        .and_then(|d| d.with_second(0))
        .and_then(|d| d.with_nanosecond(0))
        .unwrap_or(dt)
}

/// The newest issuance that can be requested at `now`.
///
/// A 12:00 run only counts once the 12:xx hour is over; during 12:xx the
/// 00:00 run of the same day is the latest.
pub fn latest_issuance(now: DateTime<Utc>) -> DateTime<Utc> {
    let hour = if now.hour() > 12 { 12 } else { 0 };
    floor_to_hour(now.with_hour(hour).unwrap_or(now))
}

/// Align an arbitrary instant down to the previous 00:00/12:00 boundary.
pub fn align_to_cadence(dt: DateTime<Utc>) -> DateTime<Utc> {
    let hour = if dt.hour() >= 12 { 12 } else { 0 };
    floor_to_hour(dt.with_hour(hour).unwrap_or(dt))
}

/// Issuances from `start` to `end` inclusive at 12-hour cadence.
pub fn issuance_times(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<DateTime<Utc>> {
    let mut times = Vec::new();
    let mut current = align_to_cadence(start);
    while current <= end {
        times.push(current);
        current += Duration::hours(CADENCE_HOURS);
    }
    times
}

/// Daily valid times published for one issuance.
///
/// 00:00 runs are sampled from 12:00 the same day to +15.5 days after issuance;
/// 12:00 runs from +0 to +15 days.
pub fn valid_times(issuance: DateTime<Utc>) -> Vec<DateTime<Utc>> {
    let (first, last) = if issuance.hour() == 0 {
        let first = issuance + Duration::hours(12);
        (first, first + Duration::days(15) + Duration::hours(12))
    } else {
        (issuance, issuance + Duration::days(15))
    };

    let mut times = Vec::new();
    let mut current = first;
    while current <= last {
        times.push(current);
        current += Duration::days(1);
    }
    times
}

/// Every cell expected between `start` and `end` for each of `members`, in
/// issuance, valid_time, then member order.
pub fn expected_cells(start: DateTime<Utc>, end: DateTime<Utc>, members: &[i32]) -> Vec<Cell> {
    issuance_times(start, end)
        .into_iter()
        .flat_map(move |issuance| {
            valid_times(issuance).into_iter().flat_map(move |valid| {
                members.iter().map(move |&member| Cell {
                    issuance_time: issuance,
                    valid_time: valid,
                    member,
                })
            })
        })
        .collect()
}

/// Left difference `expected − present`, sorted by issuance, valid time, then
/// member.
pub fn find_gaps(expected: Vec<Cell>, present: &HashSet<Cell>) -> Vec<Cell> {
    let mut gaps: Vec<Cell> = expected
        .into_iter()
        .filter(|cell| !present.contains(cell))
        .collect();
    gaps.sort();
    gaps.dedup();
    gaps
}

/// Query the warehouse and return the missing (cell, member) pairs up to `now`.
///
/// `epoch` is the starting issuance when the warehouse is empty.
pub async fn detect_gaps(
    pool: &PgPool,
    epoch: DateTime<Utc>,
    now: DateTime<Utc>,
    members: &[i32],
) -> Result<Vec<Cell>, sqlx::Error> {
    let start = match queries::get_max_issuance_time(pool).await? {
        Some(latest) => latest,
        None => epoch,
    };
    let end = latest_issuance(now);

    let present: HashSet<Cell> = queries::get_present_cells(pool, start, members)
        .await?
        .into_iter()
        .map(|(issuance_time, valid_time, member)| Cell {
            issuance_time,
            valid_time,
            member,
        })
        .collect();

    let gaps = find_gaps(expected_cells(start, end, members), &present);

    tracing::debug!(
        "Gap detection from {} to {}: {} present, {} missing",
        start,
        end,
        present.len(),
        gaps.len()
    );

    Ok(gaps)
}
