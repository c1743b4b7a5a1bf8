//! Core types for grid processing.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GridProcessorError, Result};

/// A geographic bounding box in WGS84 coordinates.
///
/// `min_lon > max_lon` describes a box that crosses the antimeridian,
/// e.g. `min_lon = 170, max_lon = -170` covers 20 degrees of longitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Create a new bounding box.
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }

    /// Whether the box wraps across the 180th meridian.
    pub fn crosses_antimeridian(&self) -> bool {
        self.min_lon > self.max_lon
    }

    /// Get the width in degrees, accounting for antimeridian crossing.
    pub fn width(&self) -> f64 {
        if self.crosses_antimeridian() {
            self.max_lon - self.min_lon + 360.0
        } else {
            self.max_lon - self.min_lon
        }
    }

    /// Get the height in degrees.
    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    /// Check whether a longitude falls inside the box's longitude span.
    pub fn contains_lon(&self, lon: f64) -> bool {
        if self.crosses_antimeridian() {
            lon >= self.min_lon || lon <= self.max_lon
        } else {
            lon >= self.min_lon && lon <= self.max_lon
        }
    }

    /// Check if a point is contained within this bounding box.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && self.contains_lon(lon)
    }

    /// Check if this bounding box intersects another.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        if self.max_lat < other.min_lat || self.min_lat > other.max_lat {
            return false;
        }
        // Two longitude arcs overlap iff one contains the start of the other
        self.contains_lon(other.min_lon) || other.contains_lon(self.min_lon)
    }

    /// Grow the box by the given margins (degrees), clamping latitude to
    /// `[-90, 90]`. A longitude span that reaches 360 degrees becomes global.
    pub fn expand(&self, lon_margin: f64, lat_margin: f64) -> Self {
        let min_lat = (self.min_lat - lat_margin).max(-90.0);
        let max_lat = (self.max_lat + lat_margin).min(90.0);

        if self.width() + 2.0 * lon_margin >= 360.0 {
            return Self::new(-180.0, min_lat, 180.0, max_lat);
        }

        Self::new(
            wrap_longitude(self.min_lon - lon_margin),
            min_lat,
            wrap_longitude(self.max_lon + lon_margin),
            max_lat,
        )
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        // Global coverage
        Self::new(-180.0, -90.0, 180.0, 90.0)
    }
}

/// Map any longitude into `[-180, 180)`, leaving exactly `180` untouched.
pub fn wrap_longitude(lon: f64) -> f64 {
    if (-180.0..=180.0).contains(&lon) {
        lon
    } else {
        (lon + 180.0).rem_euclid(360.0) - 180.0
    }
}

/// Shortest angular distance between two longitudes, in degrees.
pub fn longitude_distance(a: f64, b: f64) -> f64 {
    let d = (a - b).abs() % 360.0;
    d.min(360.0 - d)
}

/// Direction of a strictly monotonic axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisOrder {
    Increasing,
    Decreasing,
}

/// Returns the direction of `values` if it is strictly monotonic and finite.
///
/// A single-element axis counts as increasing; an empty axis is rejected.
pub fn axis_order(values: &[f64]) -> Option<AxisOrder> {
    if values.is_empty() || values.iter().any(|v| !v.is_finite()) {
        return None;
    }
    if values.windows(2).all(|w| w[0] < w[1]) {
        Some(AxisOrder::Increasing)
    } else if values.windows(2).all(|w| w[0] > w[1]) {
        Some(AxisOrder::Decreasing)
    } else {
        None
    }
}

/// Human-readable metadata for one variable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariableInfo {
    /// Display title, e.g. "Significant Wave Height".
    pub title: String,
    /// Physical units, e.g. "m".
    pub units: String,
    /// Longer description.
    #[serde(default)]
    pub description: String,
    /// CF standard name when known.
    #[serde(default)]
    pub standard_name: String,
}

/// One variable of a [`Grid`]: values over (time, lat, lon), row-major.
#[derive(Debug, Clone)]
pub struct GridVariable {
    pub info: VariableInfo,
    pub data: Vec<f32>,
}

/// Coordinate axes of a canonical grid.
#[derive(Debug, Clone, PartialEq)]
pub struct GridAxes {
    /// Strictly increasing forecast instants.
    pub times: Vec<DateTime<Utc>>,
    /// Strictly monotonic latitudes (either direction).
    pub latitudes: Vec<f64>,
    /// Strictly increasing longitudes in `[-180, 180]`.
    pub longitudes: Vec<f64>,
}

impl GridAxes {
    /// Check the canonical-axis invariants.
    pub fn validate(&self) -> Result<()> {
        if self.times.is_empty() {
            return Err(GridProcessorError::invalid_grid("time axis is empty"));
        }
        if !self.times.windows(2).all(|w| w[0] < w[1]) {
            return Err(GridProcessorError::invalid_grid(
                "time axis is not strictly increasing",
            ));
        }

        if axis_order(&self.latitudes).is_none() {
            return Err(GridProcessorError::invalid_grid(
                "latitude axis is empty or not strictly monotonic",
            ));
        }
        if self.latitudes.iter().any(|lat| !(-90.0..=90.0).contains(lat)) {
            return Err(GridProcessorError::invalid_grid(
                "latitude outside [-90, 90]",
            ));
        }

        if axis_order(&self.longitudes) != Some(AxisOrder::Increasing) {
            return Err(GridProcessorError::invalid_grid(
                "longitude axis is empty or not strictly increasing",
            ));
        }
        if self
            .longitudes
            .iter()
            .any(|lon| !(-180.0..=180.0).contains(lon))
        {
            return Err(GridProcessorError::invalid_grid(
                "longitude outside the signed [-180, 180] convention",
            ));
        }
        if self.longitudes.len() > 1 {
            let span = self.longitudes[self.longitudes.len() - 1] - self.longitudes[0];
            if span >= 360.0 {
                return Err(GridProcessorError::invalid_grid(
                    "longitude axis repeats the same meridian",
                ));
            }
        }

        Ok(())
    }

    /// Dimension sizes as (time, lat, lon).
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.times.len(), self.latitudes.len(), self.longitudes.len())
    }
}

/// Canonical in-memory forecast snapshot.
///
/// Missing values are `NaN`. Constructed only through [`Grid::new`], which
/// checks that axes are canonical and every variable has exactly
/// `nt * nlat * nlon` values.
#[derive(Debug, Clone)]
pub struct Grid {
    axes: GridAxes,
    variables: BTreeMap<String, GridVariable>,
}

impl Grid {
    /// Build a grid, validating axes and variable shapes.
    pub fn new(axes: GridAxes, variables: BTreeMap<String, GridVariable>) -> Result<Self> {
        axes.validate()?;

        if variables.is_empty() {
            return Err(GridProcessorError::invalid_grid("grid has no variables"));
        }

        let (nt, ny, nx) = axes.shape();
        let expected = nt * ny * nx;
        for (name, var) in &variables {
            if var.data.len() != expected {
                return Err(GridProcessorError::invalid_grid(format!(
                    "variable '{}' has {} values, expected {} ({}x{}x{})",
                    name,
                    var.data.len(),
                    expected,
                    nt,
                    ny,
                    nx
                )));
            }
        }

        Ok(Self { axes, variables })
    }

    pub fn axes(&self) -> &GridAxes {
        &self.axes
    }

    pub fn times(&self) -> &[DateTime<Utc>] {
        &self.axes.times
    }

    pub fn latitudes(&self) -> &[f64] {
        &self.axes.latitudes
    }

    pub fn longitudes(&self) -> &[f64] {
        &self.axes.longitudes
    }

    /// Dimension sizes as (time, lat, lon).
    pub fn shape(&self) -> (usize, usize, usize) {
        self.axes.shape()
    }

    pub fn variables(&self) -> &BTreeMap<String, GridVariable> {
        &self.variables
    }

    pub fn variable(&self, name: &str) -> Option<&GridVariable> {
        self.variables.get(name)
    }

    /// Flat index of cell (t, y, x).
    pub fn index(&self, t: usize, y: usize, x: usize) -> usize {
        let (_, ny, nx) = self.shape();
        (t * ny + y) * nx + x
    }

    /// Value of `name` at (t, y, x), `None` when out of bounds.
    pub fn value(&self, name: &str, t: usize, y: usize, x: usize) -> Option<f32> {
        let (nt, ny, nx) = self.shape();
        if t >= nt || y >= ny || x >= nx {
            return None;
        }
        let idx = self.index(t, y, x);
        self.variables.get(name).map(|v| v.data[idx])
    }
}

/// Statistics about the chunk cache.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub memory_bytes: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 - 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn axes(nt: usize, lats: Vec<f64>, lons: Vec<f64>) -> GridAxes {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        GridAxes {
            times: (0..nt)
                .map(|i| t0 + chrono::Duration::hours(3 * i as i64))
                .collect(),
            latitudes: lats,
            longitudes: lons,
        }
    }

    #[test]
    fn test_bbox_intersects() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 5.0, 15.0, 15.0);
        let c = BoundingBox::new(20.0, 20.0, 30.0, 30.0);

        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
        assert!(!a.intersects(&c));
        assert!(!c.intersects(&a));
    }

    #[test]
    fn test_bbox_antimeridian() {
        let pacific = BoundingBox::new(170.0, -10.0, -170.0, 10.0);
        assert!(pacific.crosses_antimeridian());
        assert!((pacific.width() - 20.0).abs() < 1e-9);
        assert!(pacific.contains(175.0, 0.0));
        assert!(pacific.contains(-175.0, 0.0));
        assert!(!pacific.contains(0.0, 0.0));

        assert!(pacific.intersects(&BoundingBox::new(-179.0, -1.0, -160.0, 1.0)));
        assert!(BoundingBox::new(160.0, -1.0, 171.0, 1.0).intersects(&pacific));
        assert!(!pacific.intersects(&BoundingBox::new(-100.0, -1.0, 100.0, 1.0)));
    }

    #[test]
    fn test_bbox_expand() {
        let bbox = BoundingBox::new(179.0, 89.0, -179.5, 89.5).expand(1.0, 1.0);
        assert_eq!(bbox.max_lat, 90.0);
        assert!((bbox.min_lon - 178.0).abs() < 1e-9);
        assert!((bbox.max_lon - -178.5).abs() < 1e-9);

        let global = BoundingBox::new(-180.0, -90.0, 179.75, 90.0).expand(0.125, 0.125);
        assert_eq!(global.min_lon, -180.0);
        assert_eq!(global.max_lon, 180.0);
    }

    #[test]
    fn test_longitude_helpers() {
        assert_eq!(wrap_longitude(190.0), -170.0);
        assert_eq!(wrap_longitude(-190.0), 170.0);
        assert_eq!(wrap_longitude(180.0), 180.0);
        assert!((longitude_distance(179.0, -179.0) - 2.0).abs() < 1e-9);
        assert!((longitude_distance(10.0, 20.0) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_axis_order() {
        assert_eq!(axis_order(&[1.0, 2.0, 3.0]), Some(AxisOrder::Increasing));
        assert_eq!(axis_order(&[3.0, 2.0]), Some(AxisOrder::Decreasing));
        assert_eq!(axis_order(&[1.0]), Some(AxisOrder::Increasing));
        assert_eq!(axis_order(&[1.0, 1.0]), None);
        assert_eq!(axis_order(&[1.0, 3.0, 2.0]), None);
        assert_eq!(axis_order(&[]), None);
        assert_eq!(axis_order(&[1.0, f64::NAN]), None);
    }

    #[test]
    fn test_grid_new_validates_shape() {
        let mut vars = BTreeMap::new();
        vars.insert(
            "htsgwsfc".to_string(),
            GridVariable {
                info: VariableInfo::default(),
                data: vec![0.0; 2 * 2 * 3],
            },
        );
        let grid = Grid::new(axes(2, vec![0.0, 1.0], vec![0.0, 1.0, 2.0]), vars.clone()).unwrap();
        assert_eq!(grid.shape(), (2, 2, 3));
        assert_eq!(grid.index(1, 1, 2), 11);
        assert_eq!(grid.value("htsgwsfc", 1, 1, 2), Some(0.0));
        assert_eq!(grid.value("htsgwsfc", 2, 0, 0), None);

        let err = Grid::new(axes(3, vec![0.0, 1.0], vec![0.0, 1.0, 2.0]), vars).unwrap_err();
        assert!(matches!(err, GridProcessorError::InvalidGrid(_)));
    }

    #[test]
    fn test_axes_reject_non_canonical_longitudes() {
        assert!(axes(1, vec![1.0, 0.0], vec![0.0, 1.0]).validate().is_ok());
        assert!(axes(1, vec![0.0], vec![10.0, 5.0]).validate().is_err());
        assert!(axes(1, vec![0.0], vec![170.0, 190.0]).validate().is_err());
        assert!(axes(1, vec![0.0], vec![-180.0, 180.0]).validate().is_err());
        assert!(axes(1, vec![95.0], vec![0.0]).validate().is_err());
    }

    #[test]
    fn test_cache_stats_hit_rate() {
        let mut stats = CacheStats::default();
        assert!((stats.hit_rate() - 0.0).abs() < f64::EPSILON);

        stats.hits = 80;
        stats.misses = 20;
        assert!((stats.hit_rate() - 0.8).abs() < f64::EPSILON);
    }
}
