//! Test data generators for synthetic wave forecasts.
//!
//! Values follow predictable patterns so tests can compute the expected
//! value of any cell without reading it back from a fixture file.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use grid_processor::{Grid, GridAxes, GridVariable, VariableInfo};
use serde_json::json;

/// Value of a cell in generated grids: `t * 10000 + y * 100 + x`.
///
/// # Example
///
/// ```
/// use test_utils::cell_value;
///
/// assert_eq!(cell_value(0, 0, 0), 0.0);
/// assert_eq!(cell_value(1, 2, 3), 10203.0);
/// ```
pub fn cell_value(t: usize, y: usize, x: usize) -> f32 {
    (t * 10000 + y * 100 + x) as f32
}

/// Value of a cell for the `var_index`-th generated variable.
///
/// Variable 0 matches [`cell_value`]; each further variable adds 0.25.
pub fn variable_value(var_index: usize, t: usize, y: usize, x: usize) -> f32 {
    cell_value(t, y, x) + var_index as f32 * 0.25
}

/// `n` instants starting at `start`, `step_hours` apart.
pub fn time_steps(start: DateTime<Utc>, n: usize, step_hours: i64) -> Vec<DateTime<Utc>> {
    (0..n)
        .map(|i| start + Duration::hours(step_hours * i as i64))
        .collect()
}

/// `n` evenly spaced axis values from `start` by `step` (may be negative).
pub fn axis(start: f64, step: f64, n: usize) -> Vec<f64> {
    (0..n).map(|i| start + step * i as f64).collect()
}

/// Metadata for the wave variables used in tests.
pub fn wave_variable_info(name: &str) -> VariableInfo {
    let (title, units) = match name {
        "htsgwsfc" => ("Significant Wave Height", "m"),
        "perpwsfc" => ("Primary Wave Mean Period", "s"),
        "dirpwsfc" => ("Primary Wave Direction", "degrees"),
        _ => (name, ""),
    };
    VariableInfo {
        title: title.to_string(),
        units: units.to_string(),
        ..Default::default()
    }
}

/// Build a canonical grid whose variables follow [`variable_value`].
///
/// `missing` cells are set to `NaN` in every variable.
pub fn wave_grid(
    times: Vec<DateTime<Utc>>,
    latitudes: Vec<f64>,
    longitudes: Vec<f64>,
    variables: &[&str],
    missing: &[(usize, usize, usize)],
) -> Grid {
    let (nt, ny, nx) = (times.len(), latitudes.len(), longitudes.len());

    let mut vars = BTreeMap::new();
    for (k, name) in variables.iter().enumerate() {
        let mut data = Vec::with_capacity(nt * ny * nx);
        for t in 0..nt {
            for y in 0..ny {
                for x in 0..nx {
                    data.push(variable_value(k, t, y, x));
                }
            }
        }
        for &(t, y, x) in missing {
            data[(t * ny + y) * nx + x] = f32::NAN;
        }
        vars.insert(
            name.to_string(),
            GridVariable {
                info: wave_variable_info(name),
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
        vars,
    )
    .expect("generated grid must be canonical")
}

/// Raw forecast JSON with dimensions stored in `order`.
///
/// `value(t, y, x)` receives indices into the given (raw) coordinate arrays.
/// Values equal to `fill_value` mark missing data in the raw document.
pub fn raw_grid_json(
    order: [&str; 3],
    times: &[DateTime<Utc>],
    latitudes: &[f64],
    longitudes: &[f64],
    lon_convention: &str,
    variables: &[&str],
    fill_value: f32,
    value: impl Fn(usize, usize, usize) -> f32,
) -> serde_json::Value {
    let len = |dim: &str| match dim {
        "time" => times.len(),
        "lat" => latitudes.len(),
        _ => longitudes.len(),
    };
    let sizes = [len(order[0]), len(order[1]), len(order[2])];

    let mut data = Vec::with_capacity(sizes.iter().product());
    for i in 0..sizes[0] {
        for j in 0..sizes[1] {
            for k in 0..sizes[2] {
                let mut idx = [0usize; 3];
                for (pos, dim) in order.iter().enumerate() {
                    let slot = match *dim {
                        "time" => 0,
                        "lat" => 1,
                        _ => 2,
                    };
                    idx[slot] = [i, j, k][pos];
                }
                data.push(value(idx[0], idx[1], idx[2]));
            }
        }
    }

    let mut vars = serde_json::Map::new();
    for name in variables {
        let info = wave_variable_info(name);
        vars.insert(
            name.to_string(),
            json!({
                "data": data,
                "fill_value": fill_value,
                "units": info.units,
                "long_name": info.title,
            }),
        );
    }

    json!({
        "dims": order,
        "coords": {
            "time": times,
            "lat": latitudes,
            "lon": longitudes,
        },
        "lon_convention": lon_convention,
        "reference_time": times.first(),
        "variables": vars,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_wave_grid_values() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let grid = wave_grid(
            time_steps(t0, 2, 3),
            axis(20.0, -1.0, 3),
            axis(-150.0, 1.0, 4),
            &["htsgwsfc", "perpwsfc"],
            &[(1, 2, 3)],
        );
        assert_eq!(grid.shape(), (2, 3, 4));
        assert_eq!(grid.value("htsgwsfc", 1, 1, 2), Some(10102.0));
        assert_eq!(grid.value("perpwsfc", 1, 1, 2), Some(10102.25));
        assert!(grid.value("htsgwsfc", 1, 2, 3).unwrap().is_nan());
        assert_eq!(grid.variable("perpwsfc").unwrap().info.units, "s");
    }

    #[test]
    fn test_raw_grid_json_layout() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let raw = raw_grid_json(
            ["lat", "lon", "time"],
            &time_steps(t0, 2, 6),
            &[0.0, 1.0],
            &[0.0, 90.0, 180.0],
            "0-360",
            &["htsgwsfc"],
            -999.0,
            cell_value,
        );
        let data = raw["variables"]["htsgwsfc"]["data"].as_array().unwrap();
        assert_eq!(data.len(), 12);
        // Innermost dimension is time: (lat 0, lon 1, t 1)
        assert_eq!(data[3].as_f64().unwrap(), cell_value(1, 0, 1) as f64);
        assert_eq!(raw["dims"][2], "time");
    }
}
