//! GEFS object naming.
//!
//! Maps a (issuance, valid_time, member) cell to the object key published by
//! NOAA, e.g.
//! `gefs.20240526/00/atmos/pgrb2ap5/geavg.t00z.pgrb2a.0p50.f012`.
//! The layout has to match the bucket exactly.

use chrono::{DateTime, Utc};

use crate::services::gaps::Cell;

/// One file to fetch during an ingestion run. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub issuance_time: DateTime<Utc>,
    pub valid_time: DateTime<Utc>,
    pub member: i32,
    pub url: String,
}

impl DownloadTask {
    pub fn new(
        base_url: &str,
        issuance_time: DateTime<Utc>,
        valid_time: DateTime<Utc>,
        member: i32,
    ) -> Self {
        Self {
            issuance_time,
            valid_time,
            member,
            url: build_link(base_url, issuance_time, valid_time, member),
        }
    }

    pub fn lead_hours(&self) -> i64 {
        lead_hours(self.issuance_time, self.valid_time)
    }

    /// Object key with `/` flattened to `.`, used to name the scratch file.
    pub fn scratch_name(&self) -> String {
        object_key(self.issuance_time, self.valid_time, self.member).replace('/', ".")
    }
}

/// Ensemble member prefix: `geavg` (mean), `gec00` (control), `gepNN`.
pub fn member_code(member: i32) -> String {
    match member {
        -1 => "geavg".to_string(),
        0 => "gec00".to_string(),
        n => format!("gep{:02}", n),
    }
}

/// Whole hours between issuance and valid time (floored).
pub fn lead_hours(issuance_time: DateTime<Utc>, valid_time: DateTime<Utc>) -> i64 {
    (valid_time - issuance_time).num_seconds().div_euclid(3600)
}

fn object_key(issuance_time: DateTime<Utc>, valid_time: DateTime<Utc>, member: i32) -> String {
    let hour = issuance_time.format("%H");
    format!(
        "gefs.{}/{}/atmos/pgrb2ap5/{}.t{}z.pgrb2a.0p50.f{:03}",
        issuance_time.format("%Y%m%d"),
        hour,
        member_code(member),
        hour,
        lead_hours(issuance_time, valid_time),
    )
}

/// Full download URL for a cell. `base_url` carries no trailing slash.
pub fn build_link(
    base_url: &str,
    issuance_time: DateTime<Utc>,
    valid_time: DateTime<Utc>,
    member: i32,
) -> String {
    format!("{}/{}", base_url, object_key(issuance_time, valid_time, member))
}

/// One task per missing (cell, member) pair, in gap order.
pub fn expand_tasks(base_url: &str, gaps: &[Cell]) -> Vec<DownloadTask> {
    gaps.iter()
        .map(|cell| DownloadTask::new(base_url, cell.issuance_time, cell.valid_time, cell.member))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://noaa-gefs-pds.s3.amazonaws.com";

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse::<DateTime<Utc>>().unwrap()
    }

    #[test]
    fn test_member_codes() {
        assert_eq!(member_code(-1), "geavg");
        assert_eq!(member_code(0), "gec00");
        assert_eq!(member_code(7), "gep07");
        assert_eq!(member_code(30), "gep30");
    }

    #[test]
    fn test_link_for_ensemble_mean_midnight_run() {
        let link = build_link(
            BASE,
            ts("2024-05-26T00:00:00Z"),
            ts("2024-05-26T12:00:00Z"),
            -1,
        );
        assert_eq!(
            link,
            "https://noaa-gefs-pds.s3.amazonaws.com/gefs.20240526/00/atmos/pgrb2ap5/geavg.t00z.pgrb2a.0p50.f012"
        );
    }

    #[test]
    fn test_link_for_perturbed_member_noon_run() {
        let link = build_link(
            BASE,
            ts("2024-05-26T12:00:00Z"),
            ts("2024-06-10T12:00:00Z"),
            5,
        );
        assert_eq!(
            link,
            "https://noaa-gefs-pds.s3.amazonaws.com/gefs.20240526/12/atmos/pgrb2ap5/gep05.t12z.pgrb2a.0p50.f360"
        );
    }

    #[test]
    fn test_link_zero_lead_control() {
        let t = ts("2024-05-26T12:00:00Z");
        assert_eq!(
            build_link(BASE, t, t, 0),
            "https://noaa-gefs-pds.s3.amazonaws.com/gefs.20240526/12/atmos/pgrb2ap5/gec00.t12z.pgrb2a.0p50.f000"
        );
    }

    #[test]
    fn test_link_is_deterministic() {
        let i = ts("2024-05-27T00:00:00Z");
        let v = ts("2024-06-01T12:00:00Z");
        assert_eq!(build_link(BASE, i, v, 3), build_link(BASE, i, v, 3));
    }

    #[test]
    fn test_lead_hours() {
        assert_eq!(
            lead_hours(ts("2024-05-26T00:00:00Z"), ts("2024-06-10T12:00:00Z")),
            372
        );
        assert_eq!(
            lead_hours(ts("2024-05-26T00:00:00Z"), ts("2024-05-26T00:59:00Z")),
            0
        );
    }

    #[test]
    fn test_scratch_name_has_no_slashes() {
        let task = DownloadTask::new(
            BASE,
            ts("2024-05-26T00:00:00Z"),
            ts("2024-05-26T12:00:00Z"),
            -1,
        );
        assert_eq!(
            task.scratch_name(),
            "gefs.20240526.00.atmos.pgrb2ap5.geavg.t00z.pgrb2a.0p50.f012"
        );
        assert_eq!(task.lead_hours(), 12);
    }

    #[test]
    fn test_expand_tasks_per_missing_member_in_order() {
        let issuance = ts("2024-05-26T12:00:00Z");
        let cell = |valid: &str, member| Cell {
            issuance_time: issuance,
            valid_time: ts(valid),
            member,
        };
        let gaps = vec![
            cell("2024-05-26T12:00:00Z", -1),
            cell("2024-05-26T12:00:00Z", 1),
            cell("2024-05-27T12:00:00Z", -1),
            cell("2024-05-27T12:00:00Z", 0),
        ];
        let tasks = expand_tasks(BASE, &gaps);
        assert_eq!(
            tasks.iter().map(|t| t.member).collect::<Vec<_>>(),
            vec![-1, 1, -1, 0]
        );
        assert!(tasks[1].url.ends_with("gep01.t12z.pgrb2a.0p50.f000"));
        assert!(tasks[2].url.ends_with("geavg.t12z.pgrb2a.0p50.f024"));
    }

    #[test]
    fn test_control_already_written_only_mean_fetched() {
        use crate::services::gaps::{expected_cells, find_gaps};
        use std::collections::HashSet;

        // First run: the mean file was missing upstream, the control landed.
        let issuance = ts("2024-05-26T12:00:00Z");
        let members = [-1, 0];
        let written: HashSet<Cell> = expected_cells(issuance, issuance, &[0]).into_iter().collect();

        let gaps = find_gaps(expected_cells(issuance, issuance, &members), &written);
        let tasks = expand_tasks(BASE, &gaps);

        assert_eq!(tasks.len(), 16);
        assert!(tasks.iter().all(|t| t.member == -1));
        assert!(tasks.iter().all(|t| t.url.contains("/geavg.")));
    }
}
