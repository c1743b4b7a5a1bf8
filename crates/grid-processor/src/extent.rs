//! Spatial and temporal extent of a grid.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{BoundingBox, Grid};

/// Temporal extent: first and last instant plus every instant in between.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalExtent {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub instants: Vec<DateTime<Utc>>,
}

/// Bounding box of cell centers and the temporal extent of a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetExtent {
    pub bbox: BoundingBox,
    pub temporal: TemporalExtent,
}

/// Compute the extent of a canonical grid.
pub fn compute_extent(grid: &Grid) -> DatasetExtent {
    extent_from_axes(grid.times(), grid.latitudes(), grid.longitudes())
}

/// Compute an extent directly from coordinate axes.
///
/// All three axes must be non-empty; this holds for any validated grid.
pub fn extent_from_axes(
    times: &[DateTime<Utc>],
    latitudes: &[f64],
    longitudes: &[f64],
) -> DatasetExtent {
    let min_lat = latitudes.iter().copied().fold(f64::INFINITY, f64::min);
    let max_lat = latitudes.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let (min_lon, max_lon) = longitude_range(longitudes);

    let mut instants = times.to_vec();
    instants.sort();
    instants.dedup();
    let start = instants.first().copied().unwrap_or_default();
    let end = instants.last().copied().unwrap_or_default();

    DatasetExtent {
        bbox: BoundingBox::new(min_lon, min_lat, max_lon, max_lat),
        temporal: TemporalExtent {
            start,
            end,
            instants,
        },
    }
}

/// Longitude span `(min, max)` of a set of cell-center longitudes.
///
/// The span is the complement of the largest circular gap between sorted
/// longitudes. When that gap straddles the antimeridian the result is a plain
/// `min <= max` range; otherwise the span crosses it and `min > max`.
/// Equal gaps resolve to the plain range.
pub fn longitude_range(longitudes: &[f64]) -> (f64, f64) {
    let mut sorted: Vec<f64> = longitudes.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted.dedup();

    let (first, last) = match (sorted.first(), sorted.last()) {
        (Some(&first), Some(&last)) => (first, last),
        _ => return (-180.0, 180.0),
    };
    if sorted.len() == 1 {
        return (first, first);
    }

    let wrap_gap = first + 360.0 - last;
    let (mut gap, mut range) = (wrap_gap, (first, last));
    for pair in sorted.windows(2) {
        let interior = pair[1] - pair[0];
        if interior > gap {
            gap = interior;
            range = (pair[1], pair[0]);
        }
    }
    range
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GridAxes, GridVariable, VariableInfo};
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn t(h: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::hours(h)
    }

    #[test]
    fn test_regional_extent() {
        let ext = extent_from_axes(&[t(0), t(3), t(6)], &[30.0, 20.0, 10.0], &[-150.0, -140.0, -130.0]);
        assert_eq!(ext.bbox, BoundingBox::new(-150.0, 10.0, -130.0, 30.0));
        assert_eq!(ext.temporal.start, t(0));
        assert_eq!(ext.temporal.end, t(6));
        assert_eq!(ext.temporal.instants.len(), 3);
    }

    #[test]
    fn test_antimeridian_extent() {
        // A Pacific grid rotated from 0..360: 170..180 then -180..-170
        let lons = [-180.0, -175.0, -170.0, 170.0, 175.0];
        let (min_lon, max_lon) = longitude_range(&lons);
        assert_eq!((min_lon, max_lon), (170.0, -170.0));
        let bbox = BoundingBox::new(min_lon, 0.0, max_lon, 1.0);
        assert!(bbox.crosses_antimeridian());
        assert!((bbox.width() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_global_extent_is_plain_range() {
        let lons: Vec<f64> = (0..1440).map(|i| -180.0 + 0.25 * i as f64).collect();
        assert_eq!(longitude_range(&lons), (-180.0, 179.75));
    }

    #[test]
    fn test_single_longitude() {
        assert_eq!(longitude_range(&[42.0]), (42.0, 42.0));
    }

    #[test]
    fn test_equal_gaps_prefer_plain_range() {
        // Four points 90 degrees apart: every gap equals the wrap gap
        assert_eq!(longitude_range(&[-135.0, -45.0, 45.0, 135.0]), (-135.0, 135.0));
    }

    #[test]
    fn test_compute_extent_from_grid() {
        let axes = GridAxes {
            times: vec![t(0)],
            latitudes: vec![-10.0, 10.0],
            longitudes: vec![175.0, 180.0],
        };
        let mut vars = BTreeMap::new();
        vars.insert(
            "htsgwsfc".to_string(),
            GridVariable {
                info: VariableInfo::default(),
                data: vec![1.0; 4],
            },
        );
        let grid = Grid::new(axes, vars).unwrap();
        let ext = compute_extent(&grid);
        assert_eq!(ext.bbox, BoundingBox::new(175.0, -10.0, 180.0, 10.0));
        assert_eq!(ext.temporal.start, ext.temporal.end);
    }
}
