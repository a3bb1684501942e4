//! GRIB2 field extraction.
//!
//! A GEFS `pgrb2a` file carries one message per (parameter, level). The
//! extractor reads the messages belonging to the field groups we care about,
//! samples them at the lattice nodes and merges everything into one row per
//! (grid point, member).
//!
//! Each field group contributes a fixed subset of columns; a column no group
//! provided stays `None`.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::db::models::ForecastRecord;
use crate::services::lattice::{GridLattice, GridPoint};
use crate::services::links::DownloadTask;
use crate::services::normalize::normalize;

/// Member used when the source has no ensemble dimension (mean or single run).
const DEFAULT_MEMBER: i32 = -1;

/// GRIB2 fixed-surface codes (code table 4.5).
const SURFACE_GROUND: u8 = 1;
const SURFACE_ENTIRE_ATMOSPHERE: u8 = 10;
const SURFACE_MEAN_SEA_LEVEL: u8 = 101;
const SURFACE_HEIGHT_ABOVE_GROUND: u8 = 103;

/// Product templates describing an individual ensemble member (4.1, 4.11).
const ENSEMBLE_MEMBER_TEMPLATES: [u16; 2] = [1, 11];

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("Download failed: {0}")]
    Download(String),
    #[error("Provider returned HTTP {0}")]
    HttpStatus(u16),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("GRIB2 decode error: {0}")]
    Decode(String),
    #[error("No lattice fields found in file")]
    NoFields,
    #[error("Timed out after {0}s")]
    Timeout(u64),
    #[error("Worker failed: {0}")]
    Worker(String),
}

/// Warehouse measurement columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    U10,
    V10,
    Tp,
    Tcc,
    T2m,
    Prmsl,
}

/// (discipline, parameter category, parameter number) per code table 4.2.
type ParamKey = (u8, u8, u8);

/// Level-type filters applied to a file, each selecting a known set of
/// parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldGroup {
    TwoMetre,
    TenMetre,
    MeanSea,
    Surface,
    Atmosphere,
}

impl FieldGroup {
    /// Groups to read for a given lead hour.
    ///
    /// The analysis file (lead 0) has no accumulated or averaged
    /// entire-atmosphere fields, so that group is not requested.
    pub fn for_lead_hours(lead_hours: i64) -> Vec<FieldGroup> {
        let mut groups = vec![
            FieldGroup::TwoMetre,
            FieldGroup::TenMetre,
            FieldGroup::MeanSea,
            FieldGroup::Surface,
        ];
        if lead_hours != 0 {
            groups.push(FieldGroup::Atmosphere);
        }
        groups
    }

    fn surface(self) -> (u8, Option<f64>) {
        match self {
            FieldGroup::TwoMetre => (SURFACE_HEIGHT_ABOVE_GROUND, Some(2.0)),
            FieldGroup::TenMetre => (SURFACE_HEIGHT_ABOVE_GROUND, Some(10.0)),
            FieldGroup::MeanSea => (SURFACE_MEAN_SEA_LEVEL, None),
            FieldGroup::Surface => (SURFACE_GROUND, None),
            FieldGroup::Atmosphere => (SURFACE_ENTIRE_ATMOSPHERE, None),
        }
    }

    fn parameters(self) -> &'static [(ParamKey, Column)] {
        match self {
            FieldGroup::TwoMetre => &[((0, 0, 0), Column::T2m)],
            FieldGroup::TenMetre => &[((0, 2, 2), Column::U10), ((0, 2, 3), Column::V10)],
            FieldGroup::MeanSea => &[((0, 3, 1), Column::Prmsl)],
            FieldGroup::Surface => &[((0, 1, 8), Column::Tp)],
            FieldGroup::Atmosphere => &[((0, 6, 1), Column::Tcc)],
        }
    }

    fn matches_surface(self, surface_type: u8, level: f64) -> bool {
        let (wanted_type, wanted_level) = self.surface();
        surface_type == wanted_type
            && wanted_level.map_or(true, |l| (l - level).abs() < 1e-6)
    }
}

/// Column a message feeds, if any of the active groups selects it.
pub fn select_column(
    groups: &[FieldGroup],
    param: (u8, u8, u8),
    surface_type: u8,
    level: f64,
) -> Option<Column> {
    groups
        .iter()
        .filter(|g| g.matches_surface(surface_type, level))
        .flat_map(|g| g.parameters().iter())
        .find(|(key, _)| *key == param)
        .map(|(_, column)| *column)
}

/// One decoded message, sampled at lattice nodes.
#[derive(Debug, Clone)]
pub struct DecodedField {
    pub column: Column,
    /// `Some(n)` when the message belongs to an individual ensemble member.
    pub member: Option<i32>,
    pub values: Vec<(GridPoint, Option<f64>)>,
}

/// Merged measurements for one (grid point, member).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedRow {
    pub point: GridPoint,
    pub member: i32,
    pub u10: Option<f64>,
    pub v10: Option<f64>,
    pub tp: Option<f64>,
    pub tcc: Option<f64>,
    pub t2m: Option<f64>,
    pub prmsl: Option<f64>,
}

impl MergedRow {
    fn set(&mut self, column: Column, value: Option<f64>) {
        let slot = match column {
            Column::U10 => &mut self.u10,
            Column::V10 => &mut self.v10,
            Column::Tp => &mut self.tp,
            Column::Tcc => &mut self.tcc,
            Column::T2m => &mut self.t2m,
            Column::Prmsl => &mut self.prmsl,
        };
        *slot = value;
    }
}

/// Outer-join decoded fields on (longitude, latitude, member).
///
/// At lead hour zero precipitation and cloud cover are forced to `None`:
/// neither exists at the analysis instant and zero would read as a real value.
pub fn merge_fields(
    fields: &[DecodedField],
    lead_hours: i64,
) -> Result<Vec<MergedRow>, ExtractError> {
    if fields.is_empty() {
        return Err(ExtractError::NoFields);
    }

    let mut rows: BTreeMap<(i32, i32, i32), MergedRow> = BTreeMap::new();
    for field in fields {
        let member = field.member.unwrap_or(DEFAULT_MEMBER);
        for &(point, value) in &field.values {
            let row = rows
                .entry((point.longitude, point.latitude, member))
                .or_insert_with(|| MergedRow {
                    point,
                    member,
                    ..MergedRow::default()
                });
            row.set(field.column, value);
        }
    }

    if lead_hours == 0 {
        for row in rows.values_mut() {
            row.tp = None;
            row.tcc = None;
        }
    }

    Ok(rows.into_values().collect())
}

fn decode_error(e: impl std::fmt::Display) -> ExtractError {
    ExtractError::Decode(e.to_string())
}

/// Read the messages of `path` selected by `groups`, sampled at lattice nodes.
pub fn decode_file(
    path: &Path,
    lattice: &GridLattice,
    groups: &[FieldGroup],
    task_member: i32,
) -> Result<Vec<DecodedField>, ExtractError> {
    let reader = BufReader::new(File::open(path)?);
    let grib2 = grib::from_reader(reader).map_err(decode_error)?;

    let mut fields = Vec::new();
    for (_index, submessage) in grib2.iter() {
        let discipline = submessage.indicator().discipline;
        let prod_def = submessage.prod_def();
        let (Some(category), Some(number)) =
            (prod_def.parameter_category(), prod_def.parameter_number())
        else {
            continue;
        };
        let Some((surface, _)) = prod_def.fixed_surfaces() else {
            continue;
        };
        let Some(column) = select_column(
            groups,
            (discipline, category, number),
            surface.surface_type,
            surface.value(),
        ) else {
            continue;
        };

        let member = ENSEMBLE_MEMBER_TEMPLATES
            .contains(&prod_def.prod_tmpl_num())
            .then_some(task_member);

        let latlons: Vec<(f32, f32)> = submessage.latlons().map_err(decode_error)?.collect();
        let decoder = grib::Grib2SubmessageDecoder::from(submessage).map_err(decode_error)?;
        let decoded = decoder.dispatch().map_err(decode_error)?;

        let values = latlons
            .into_iter()
            .zip(decoded)
            .filter_map(|((lat, lon), value)| {
                lattice.node_at(lat, lon).map(|point| {
                    let value = value.is_finite().then_some(f64::from(value));
                    (point, value)
                })
            })
            .collect::<Vec<_>>();

        if values.is_empty() {
            continue;
        }

        fields.push(DecodedField {
            column,
            member,
            values,
        });
    }

    Ok(fields)
}

/// Decode, merge and normalize one downloaded file.
pub fn extract_file(
    path: &Path,
    task: &DownloadTask,
    lattice: &GridLattice,
) -> Result<Vec<ForecastRecord>, ExtractError> {
    let lead_hours = task.lead_hours();
    let groups = FieldGroup::for_lead_hours(lead_hours);
    let fields = decode_file(path, lattice, &groups, task.member)?;
    let rows = merge_fields(&fields, lead_hours)?;

    tracing::debug!(
        "Extracted {} fields into {} rows from {}",
        fields.len(),
        rows.len(),
        task.url
    );

    Ok(normalize(task, rows))
}
