use std::path::Path;

use itertools::Itertools;
use log::{debug, info};
use serde::Deserialize;

use crate::error::{BlazarError, Result};
use crate::models::{SedData, SedPoint};

#[derive(Debug, Deserialize)]
struct SedRow {
    #[serde(default)]
    instrument: String,
    #[serde(alias = "freq", alias = "v")]
    nu: f64,
    #[serde(default)]
    nu_err_low: f64,
    #[serde(default)]
    nu_err_high: f64,
    #[serde(alias = "vFv", alias = "nuFnu")]
    nufnu: f64,
    err_low: f64,
    err_high: f64,
}

/// Read observed SED points from a CSV file.
///
/// Rows with a zero lower error are upper limits; their lower error bar is
/// replaced by a quarter of the flux so they can be drawn as arrows.
pub fn read_sed_data(path: impl AsRef<Path>) -> Result<SedData> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_path(path)
        .map_err(|e| BlazarError::csv(path, e))?;

    let mut points = Vec::new();
    for (line, row) in reader.deserialize::<SedRow>().enumerate() {
        let row = row.map_err(|e| BlazarError::csv(path, e))?;
        points.push(validate_row(row, line + 1)?);
    }
    if points.is_empty() {
        return Err(BlazarError::Data(format!("{} has no data rows", path.display())));
    }

    let data = SedData { points };
    let n_ul = data.points.iter().filter(|p| p.upper_limit).count();
    info!(
        "Read {} SED points ({} upper limits, {} instruments) from {}",
        data.len(),
        n_ul,
        instrument_groups(&data).len(),
        path.display()
    );
    Ok(data)
}

fn validate_row(row: SedRow, line: usize) -> Result<SedPoint> {
    if !(row.nu.is_finite() && row.nu > 0.0) {
        return Err(BlazarError::Data(format!("row {line}: frequency {} must be positive", row.nu)));
    }
    if !(row.nufnu.is_finite() && row.nufnu > 0.0) {
        return Err(BlazarError::Data(format!("row {line}: flux {} must be positive", row.nufnu)));
    }
    let errs = [row.err_low, row.err_high, row.nu_err_low, row.nu_err_high];
    if errs.iter().any(|e| !e.is_finite() || *e < 0.0) {
        return Err(BlazarError::Data(format!("row {line}: errors must be finite and non-negative")));
    }

    let upper_limit = row.err_low == 0.0;
    if upper_limit {
        debug!("row {line}: upper limit at nu = {:e}", row.nu);
    }
    Ok(SedPoint {
        instrument: row.instrument,
        nu: row.nu,
        nu_err_low: row.nu_err_low,
        nu_err_high: row.nu_err_high,
        nufnu: row.nufnu,
        err_low: if upper_limit { row.nufnu / 4.0 } else { row.err_low },
        err_high: row.err_high,
        upper_limit,
    })
}

/// A run of consecutive points from the same instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentGroup<'a> {
    /// Position of the run in file order; picks colour and marker.
    pub index: usize,
    pub instrument: &'a str,
    pub points: Vec<&'a SedPoint>,
}

pub fn instrument_groups(data: &SedData) -> Vec<InstrumentGroup<'_>> {
    data.points
        .iter()
        .chunk_by(|p| p.instrument.as_str())
        .into_iter()
        .enumerate()
        .map(|(index, (instrument, points))| InstrumentGroup {
            index,
            instrument,
            points: points.collect(),
        })
        .collect()
}
