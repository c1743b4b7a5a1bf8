//! Mapping of query coordinates and datetimes onto grid indices.
//!
//! Every function here is pure and works on the axes of one store:
//! latitudes strictly monotonic in either direction, longitudes strictly
//! increasing in the signed convention, times strictly increasing.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use edr_protocol::{AreaGeometry, DateTimeQuery};
use grid_processor::{longitude_distance, wrap_longitude, BoundingBox, GridAxes};

use super::error::QueryError;

/// Slack for comparisons against stored coordinates.
const EPSILON: f64 = 1e-9;

/// A resolved horizontal cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellMatch {
    pub y: usize,
    pub x: usize,
    /// The requested coordinate is the cell center itself.
    pub exact: bool,
}

/// A resolved time step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeMatch {
    pub index: usize,
    /// The requested instant is the time step itself.
    pub exact: bool,
}

/// Index of the value nearest to `value` on a strictly monotonic axis.
///
/// A value exactly halfway between two neighbours resolves to the lower index.
pub fn nearest_index(axis: &[f64], value: f64) -> usize {
    let n = axis.len();
    if n <= 1 {
        return 0;
    }
    let increasing = axis[n - 1] > axis[0];
    let upper = axis.partition_point(|&a| if increasing { a < value } else { a > value });
    if upper == 0 {
        return 0;
    }
    if upper == n {
        return n - 1;
    }
    let below = (value - axis[upper - 1]).abs();
    let above = (axis[upper] - value).abs();
    if above < below {
        upper
    } else {
        upper - 1
    }
}

/// Like [`nearest_index`], with longitudes compared around the circle.
///
/// The axis ends are candidates too, so 179.9 can resolve to -180.
pub fn nearest_lon_index(axis: &[f64], lon: f64) -> usize {
    let n = axis.len();
    if n <= 1 {
        return 0;
    }
    let mut best = nearest_index(axis, lon);
    let mut best_distance = longitude_distance(axis[best], lon);
    for candidate in [0, n - 1] {
        let distance = longitude_distance(axis[candidate], lon);
        if distance < best_distance || (distance == best_distance && candidate < best) {
            best = candidate;
            best_distance = distance;
        }
    }
    best
}

/// Half the distance from `axis[i]` to its closest neighbour; zero for a
/// single-value axis.
fn half_spacing(axis: &[f64], i: usize) -> f64 {
    let mut spacing = f64::INFINITY;
    if i > 0 {
        spacing = spacing.min((axis[i] - axis[i - 1]).abs());
    }
    if i + 1 < axis.len() {
        spacing = spacing.min((axis[i + 1] - axis[i]).abs());
    }
    if spacing.is_finite() {
        spacing / 2.0
    } else {
        0.0
    }
}

/// Smallest half spacing along an axis.
fn min_half_spacing(axis: &[f64]) -> f64 {
    axis.windows(2)
        .map(|w| (w[1] - w[0]).abs() / 2.0)
        .reduce(f64::min)
        .unwrap_or(0.0)
}

/// Nearest cell to a point, without any coverage check.
pub fn nearest_cell(axes: &GridAxes, lon: f64, lat: f64) -> CellMatch {
    let y = nearest_index(&axes.latitudes, lat);
    let x = nearest_lon_index(&axes.longitudes, lon);
    let exact = (axes.latitudes[y] - lat).abs() <= EPSILON
        && longitude_distance(axes.longitudes[x], lon) <= EPSILON;
    CellMatch { y, x, exact }
}

/// Resolve a point to its cell, or `None` when the point is farther than
/// half a cell from every cell center.
pub fn locate_point(axes: &GridAxes, lon: f64, lat: f64) -> Option<CellMatch> {
    let cell = nearest_cell(axes, lon, lat);
    let dy = (axes.latitudes[cell.y] - lat).abs();
    let dx = longitude_distance(axes.longitudes[cell.x], lon);
    let covered = dy <= half_spacing(&axes.latitudes, cell.y) + EPSILON
        && dx <= half_spacing(&axes.longitudes, cell.x) + EPSILON;
    covered.then_some(cell)
}

/// Whether a query box overlaps the grid extent grown by half a cell.
pub fn touches_extent(axes: &GridAxes, extent: &BoundingBox, query: &BoundingBox) -> bool {
    let grown = extent.expand(
        min_half_spacing(&axes.longitudes),
        min_half_spacing(&axes.latitudes),
    );
    grown.intersects(query)
}

/// Query box of an area geometry, in grid terms.
pub fn envelope_box(geometry: &AreaGeometry) -> BoundingBox {
    let env = geometry.envelope();
    BoundingBox::new(env.west, env.south, env.east, env.north)
}

/// Center of a (possibly antimeridian-crossing) box.
pub fn box_center(bbox: &BoundingBox) -> (f64, f64) {
    let lon = wrap_longitude(bbox.min_lon + bbox.width() / 2.0);
    let lat = (bbox.min_lat + bbox.max_lat) / 2.0;
    (lon, lat)
}

/// Rows and columns of a grid inside a geometry's envelope.
///
/// Rows follow the latitude axis. Within a row, a box crossing the
/// antimeridian lists its western part (up to 180) before its eastern part.
/// Only the axes are materialized; cells are produced on demand so a
/// request can be sized before anything per cell is allocated.
pub struct AreaSpan<'a> {
    axes: &'a GridAxes,
    geometry: &'a AreaGeometry,
    rows: Vec<usize>,
    columns: Vec<usize>,
}

impl AreaSpan<'_> {
    /// Number of cells whose centers lie inside the geometry.
    pub fn count(&self) -> usize {
        match self.geometry {
            AreaGeometry::Bbox(_) => self.rows.len() * self.columns.len(),
            AreaGeometry::Polygon(_) => self.iter().count(),
        }
    }

    /// Cells whose centers lie inside the geometry.
    pub fn cells(&self) -> Vec<CellMatch> {
        self.iter().collect()
    }

    fn iter(&self) -> impl Iterator<Item = CellMatch> + '_ {
        self.rows.iter().flat_map(move |&y| {
            self.columns.iter().filter_map(move |&x| {
                self.geometry
                    .contains(self.axes.longitudes[x], self.axes.latitudes[y])
                    .then_some(CellMatch { y, x, exact: true })
            })
        })
    }
}

pub fn area_span<'a>(axes: &'a GridAxes, geometry: &'a AreaGeometry) -> AreaSpan<'a> {
    let bbox = envelope_box(geometry);

    let rows: Vec<usize> = axes
        .latitudes
        .iter()
        .enumerate()
        .filter(|&(_, &lat)| lat >= bbox.min_lat - EPSILON && lat <= bbox.max_lat + EPSILON)
        .map(|(y, _)| y)
        .collect();

    let mut columns: Vec<usize> = axes
        .longitudes
        .iter()
        .enumerate()
        .filter(|&(_, &lon)| contains_lon(&bbox, lon))
        .map(|(x, _)| x)
        .collect();
    if bbox.crosses_antimeridian() {
        // Stable: west part keeps axis order, east part follows
        columns.sort_by_key(|&x| axes.longitudes[x] < bbox.min_lon - EPSILON);
    }

    AreaSpan {
        axes,
        geometry,
        rows,
        columns,
    }
}

fn contains_lon(bbox: &BoundingBox, lon: f64) -> bool {
    // -180 and 180 name the same meridian
    bbox.contains_lon(lon) || (lon.abs() == 180.0 && bbox.contains_lon(-lon))
}

/// Default time tolerance: half the smallest step, zero for a single step.
pub fn default_time_tolerance(times: &[DateTime<Utc>]) -> Duration {
    times
        .windows(2)
        .map(|w| w[1] - w[0])
        .min()
        .map_or(Duration::zero(), |step| step / 2)
}

/// Resolve a datetime filter against the time axis.
///
/// `None` selects the full series. Instants (alone or in a list) resolve to
/// the nearest step within `tolerance`; anything outside the temporal extent
/// is `OutOfRange`. Intervals select the steps they contain.
pub fn select_times(
    times: &[DateTime<Utc>],
    query: Option<&DateTimeQuery>,
    tolerance: Duration,
) -> Result<Vec<TimeMatch>, QueryError> {
    match query {
        None => Ok((0..times.len())
            .map(|index| TimeMatch { index, exact: true })
            .collect()),
        Some(DateTimeQuery::Instant(t)) => Ok(vec![match_instant(times, *t, tolerance)?]),
        Some(DateTimeQuery::List(list)) => {
            let mut matches = list
                .iter()
                .map(|t| match_instant(times, *t, tolerance))
                .collect::<Result<Vec<_>, _>>()?;
            matches.sort_by_key(|m| (m.index, !m.exact));
            matches.dedup_by_key(|m| m.index);
            Ok(matches)
        }
        Some(DateTimeQuery::Interval { start, end }) => {
            let matches: Vec<TimeMatch> = times
                .iter()
                .enumerate()
                .filter(|&(_, t)| start.map_or(true, |s| *t >= s) && end.map_or(true, |e| *t <= e))
                .map(|(index, _)| TimeMatch { index, exact: true })
                .collect();
            if matches.is_empty() {
                let bound = |b: &Option<DateTime<Utc>>| b.map_or("..".to_string(), format_instant);
                return Err(QueryError::OutOfRange(format!(
                    "no forecast instants between {} and {}",
                    bound(start),
                    bound(end)
                )));
            }
            Ok(matches)
        }
    }
}

fn match_instant(
    times: &[DateTime<Utc>],
    t: DateTime<Utc>,
    tolerance: Duration,
) -> Result<TimeMatch, QueryError> {
    let (Some(&first), Some(&last)) = (times.first(), times.last()) else {
        return Err(QueryError::OutOfRange("dataset has no instants".to_string()));
    };
    if t < first || t > last {
        return Err(QueryError::OutOfRange(format!(
            "{} is outside the available range {} to {}",
            format_instant(t),
            format_instant(first),
            format_instant(last)
        )));
    }

    let upper = times.partition_point(|&s| s < t);
    let index = if upper == 0 {
        0
    } else if upper == times.len() || t - times[upper - 1] <= times[upper] - t {
        upper - 1
    } else {
        upper
    };
    let offset = (times[index] - t).abs();
    if offset > tolerance {
        return Err(QueryError::OutOfRange(format!(
            "no forecast instant within {}s of {}",
            tolerance.num_seconds(),
            format_instant(t)
        )));
    }

    Ok(TimeMatch {
        index,
        exact: offset.is_zero(),
    })
}

/// RFC 3339 with a `Z` suffix, as used in every response.
pub fn format_instant(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}
