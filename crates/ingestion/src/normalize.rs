//! Grid normalization.
//!
//! Turns a [`RawGrid`] into the canonical [`Grid`]:
//!
//! - dimensions reordered to (time, lat, lon)
//! - time and longitude increasing; latitude keeps its direction
//! - 0..360 longitudes rotated into the signed convention
//! - fill values and out-of-range values replaced by `NaN`
//! - optional region and time-step subset
//!
//! Every step only re-indexes the axes. Values are gathered once at the end
//! through per-axis index maps, so reordering, rotation, reversal and
//! subsetting compose without intermediate copies.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use grid_processor::{axis_order, AxisOrder, Grid, GridAxes, GridVariable, VariableInfo};
use tracing::{debug, warn};

use crate::config::NormalizeOptions;
use crate::error::{IngestionError, Result};
use crate::raw::{Axis, LonConvention, RawGrid, RawVariable};
use crate::tables;

/// Normalize a raw grid. Pure; never touches storage.
pub fn normalize(raw: &RawGrid, options: &NormalizeOptions) -> Result<Grid> {
    let layout = Layout::from_raw(raw)?;

    let times = parse_times(raw)?;
    let latitudes = parse_axis(raw, Axis::Lat)?;
    let longitudes = parse_axis(raw, Axis::Lon)?;
    if times.is_empty() || latitudes.is_empty() || longitudes.is_empty() {
        return Err(IngestionError::malformed("empty coordinate axis"));
    }

    let (mut time_map, mut times) = order_times(times)?;
    let (mut lat_map, mut latitudes) = order_latitudes(latitudes)?;
    let (mut lon_map, mut longitudes) = order_longitudes(longitudes, raw.lon_convention)?;

    if let Some(region) = &options.region {
        retain_indices(&mut lat_map, &mut latitudes, |lat| region.contains_lat(lat));
        retain_indices(&mut lon_map, &mut longitudes, |lon| region.contains_lon(lon));
        if latitudes.is_empty() || longitudes.is_empty() {
            return Err(IngestionError::malformed(format!(
                "region {:?} selects no grid cells",
                region
            )));
        }
    }
    if let Some(max_steps) = options.max_time_steps {
        time_map.truncate(max_steps);
        times.truncate(max_steps);
    }

    let selected = select_variables(raw, &options.variables)?;

    let mut variables = BTreeMap::new();
    for (name, raw_var) in selected {
        if raw_var.data.len() != layout.len() {
            return Err(IngestionError::malformed(format!(
                "variable '{}' has {} values, dimensions need {}",
                name,
                raw_var.data.len(),
                layout.len()
            )));
        }

        let entry = tables::lookup(&name);
        let valid_range = entry.map(|e| e.valid_range);

        let mut data = Vec::with_capacity(time_map.len() * lat_map.len() * lon_map.len());
        let mut missing = 0usize;
        for &t in &time_map {
            for &y in &lat_map {
                for &x in &lon_map {
                    let value = raw_var.data[layout.offset(t, y, x)];
                    let clean = match value {
                        v if raw_var.is_missing(v) => f32::NAN,
                        Some(v) if valid_range.map_or(true, |r| r.is_valid(v)) => v,
                        _ => f32::NAN,
                    };
                    if clean.is_nan() {
                        missing += 1;
                    }
                    data.push(clean);
                }
            }
        }

        debug!(variable = %name, missing, cells = data.len(), "Normalized variable");
        variables.insert(
            name.clone(),
            GridVariable {
                info: variable_info(&name, raw_var),
                data,
            },
        );
    }

    Grid::new(
        GridAxes {
            times,
            latitudes,
            longitudes,
        },
        variables,
    )
    .map_err(|e| IngestionError::malformed(e.to_string()))
}

/// Storage layout of the raw arrays.
struct Layout {
    /// Position of time, lat, lon within `dims`.
    positions: [usize; 3],
    sizes: [usize; 3],
}

impl Layout {
    fn from_raw(raw: &RawGrid) -> Result<Self> {
        if raw.dims.len() != 3 {
            return Err(IngestionError::malformed(format!(
                "expected 3 dimensions, got {} ({})",
                raw.dims.len(),
                raw.dims.join(", ")
            )));
        }

        let mut positions = [usize::MAX; 3];
        let mut sizes = [0usize; 3];
        for (pos, name) in raw.dims.iter().enumerate() {
            let axis = Axis::from_dim_name(name).ok_or_else(|| {
                IngestionError::malformed(format!("unknown dimension '{}'", name))
            })?;
            let slot = axis_slot(axis);
            if positions[slot] != usize::MAX {
                return Err(IngestionError::malformed(format!(
                    "dimension {} appears twice",
                    axis
                )));
            }
            positions[slot] = pos;
            sizes[pos] = raw
                .coords_for(axis)
                .ok_or_else(|| IngestionError::malformed(format!("no coordinates for {}", axis)))?
                .len();
        }

        Ok(Self { positions, sizes })
    }

    fn len(&self) -> usize {
        self.sizes.iter().product()
    }

    fn stride(&self, pos: usize) -> usize {
        self.sizes[pos + 1..].iter().product()
    }

    /// Flat offset of raw indices (t, y, x).
    fn offset(&self, t: usize, y: usize, x: usize) -> usize {
        t * self.stride(self.positions[0])
            + y * self.stride(self.positions[1])
            + x * self.stride(self.positions[2])
    }
}

fn axis_slot(axis: Axis) -> usize {
    match axis {
        Axis::Time => 0,
        Axis::Lat => 1,
        Axis::Lon => 2,
    }
}

fn parse_times(raw: &RawGrid) -> Result<Vec<DateTime<Utc>>> {
    let values = raw
        .coords_for(Axis::Time)
        .ok_or_else(|| IngestionError::malformed("no coordinates for time"))?;
    values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            v.as_time().ok_or_else(|| {
                IngestionError::malformed(format!("time coordinate {} ({:?}) is not a timestamp", i, v))
            })
        })
        .collect()
}

fn parse_axis(raw: &RawGrid, axis: Axis) -> Result<Vec<f64>> {
    let values = raw
        .coords_for(axis)
        .ok_or_else(|| IngestionError::malformed(format!("no coordinates for {}", axis)))?;
    values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            v.as_f64().filter(|f| f.is_finite()).ok_or_else(|| {
                IngestionError::malformed(format!("{} coordinate {} ({:?}) is not a number", axis, i, v))
            })
        })
        .collect()
}

fn identity(n: usize) -> Vec<usize> {
    (0..n).collect()
}

fn order_times(times: Vec<DateTime<Utc>>) -> Result<(Vec<usize>, Vec<DateTime<Utc>>)> {
    let stamps: Vec<f64> = times.iter().map(|t| t.timestamp_millis() as f64).collect();
    match axis_order(&stamps) {
        Some(AxisOrder::Increasing) => Ok((identity(times.len()), times)),
        Some(AxisOrder::Decreasing) => {
            let map: Vec<usize> = (0..times.len()).rev().collect();
            let times = map.iter().map(|&i| times[i]).collect();
            Ok((map, times))
        }
        None => Err(IngestionError::malformed(
            "time axis is not strictly monotonic",
        )),
    }
}

fn order_latitudes(lats: Vec<f64>) -> Result<(Vec<usize>, Vec<f64>)> {
    if axis_order(&lats).is_none() {
        return Err(IngestionError::malformed(
            "latitude axis is not strictly monotonic",
        ));
    }
    if lats.iter().any(|lat| !(-90.0..=90.0).contains(lat)) {
        return Err(IngestionError::malformed("latitude outside [-90, 90]"));
    }
    Ok((identity(lats.len()), lats))
}

/// Make longitudes increasing and signed.
///
/// A 0..360 axis is rotated at the first index whose value is `>= 180`; that
/// block moves to the front with 360 subtracted. Values are never sorted.
fn order_longitudes(lons: Vec<f64>, convention: LonConvention) -> Result<(Vec<usize>, Vec<f64>)> {
    let (mut map, mut values) = match axis_order(&lons) {
        Some(AxisOrder::Increasing) => (identity(lons.len()), lons),
        Some(AxisOrder::Decreasing) => {
            let map: Vec<usize> = (0..lons.len()).rev().collect();
            let values = map.iter().map(|&i| lons[i]).collect();
            (map, values)
        }
        None => {
            return Err(IngestionError::malformed(
                "longitude axis is not strictly monotonic",
            ))
        }
    };

    match convention.resolve(&values) {
        LonConvention::ZeroTo360 => {
            if values.iter().any(|lon| !(0.0..=360.0).contains(lon)) {
                return Err(IngestionError::malformed(
                    "longitude outside [0, 360] for a 0-360 axis",
                ));
            }
            if let Some(k) = values.iter().position(|&lon| lon >= 180.0) {
                map.rotate_left(k);
                values.rotate_left(k);
                let moved = values.len() - k;
                for lon in values.iter_mut().take(moved) {
                    *lon -= 360.0;
                }
            }
            if axis_order(&values) != Some(AxisOrder::Increasing) {
                return Err(IngestionError::malformed(
                    "longitude axis repeats a meridian after conversion to signed",
                ));
            }
        }
        _ => {
            if values.iter().any(|lon| !(-180.0..=180.0).contains(lon)) {
                return Err(IngestionError::malformed(
                    "longitude outside [-180, 180] for a signed axis",
                ));
            }
        }
    }

    Ok((map, values))
}

fn retain_indices(map: &mut Vec<usize>, values: &mut Vec<f64>, keep: impl Fn(f64) -> bool) {
    let (kept_map, kept_values) = map
        .iter()
        .zip(values.iter())
        .filter(|&(_, &v)| keep(v))
        .map(|(&i, &v)| (i, v))
        .unzip();
    *map = kept_map;
    *values = kept_values;
}

/// Requested variables present in the raw grid, under their requested names.
fn select_variables<'a>(
    raw: &'a RawGrid,
    requested: &[String],
) -> Result<Vec<(String, &'a RawVariable)>> {
    if requested.is_empty() {
        if raw.variables.is_empty() {
            return Err(IngestionError::MissingVariable(Vec::new()));
        }
        return Ok(raw
            .variables
            .iter()
            .map(|(name, v)| (name.clone(), v))
            .collect());
    }

    let mut selected = Vec::new();
    let mut absent = Vec::new();
    for name in requested {
        let found = raw.variables.get(name).or_else(|| {
            raw.variables
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v)
        });
        match found {
            Some(var) => selected.push((name.clone(), var)),
            None => absent.push(name.as_str()),
        }
    }

    if selected.is_empty() {
        return Err(IngestionError::MissingVariable(requested.to_vec()));
    }
    if !absent.is_empty() {
        warn!(missing = ?absent, "Requested variables not in raw grid");
    }
    Ok(selected)
}

/// Catalog metadata, overridden by whatever the raw grid provides.
fn variable_info(name: &str, raw: &RawVariable) -> VariableInfo {
    let mut info = tables::lookup(name)
        .map(|e| e.info())
        .unwrap_or_else(|| VariableInfo {
            title: name.to_string(),
            ..Default::default()
        });

    let non_empty = |s: &Option<String>| s.as_ref().filter(|s| !s.trim().is_empty()).cloned();
    if let Some(title) = non_empty(&raw.long_name) {
        info.title = title;
    }
    if let Some(units) = non_empty(&raw.units) {
        info.units = units;
    }
    if let Some(description) = non_empty(&raw.description) {
        info.description = description;
    }
    if let Some(standard_name) = non_empty(&raw.standard_name) {
        info.standard_name = standard_name;
    }
    info
}
