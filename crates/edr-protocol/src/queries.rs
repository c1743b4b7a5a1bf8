//! Query parameter parsing for EDR endpoints.
//!
//! This module turns the loosely-typed query strings of the position and
//! area endpoints (`coords`, `bbox`, `datetime`, `parameter-name`) into typed
//! values, rejecting malformed input before it reaches data extraction.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when parsing coordinates.
#[derive(Debug, Error, PartialEq)]
pub enum CoordinateParseError {
    /// Invalid WKT format.
    #[error("Invalid WKT format: {0}")]
    InvalidWkt(String),

    /// Invalid coordinate value.
    #[error("Invalid coordinate value: {0}")]
    InvalidCoordinate(String),

    /// Missing required coordinate.
    #[error("Missing required coordinate: {0}")]
    MissingCoordinate(String),

    /// Coordinate out of valid range.
    #[error("Coordinate out of range: {0}")]
    OutOfRange(String),

    /// Invalid datetime expression.
    #[error("Invalid datetime: {0}")]
    InvalidDateTime(String),
}

/// Parsed position query parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PositionQuery {
    /// Longitude.
    pub lon: f64,

    /// Latitude.
    pub lat: f64,

    /// Requested datetime or range.
    pub datetime: Option<DateTimeQuery>,

    /// Requested parameter names.
    pub parameter_names: Option<Vec<String>>,
}

impl PositionQuery {
    /// Build a position query from raw query-string values.
    pub fn parse(
        coords: &str,
        datetime: Option<&str>,
        parameter_name: Option<&str>,
    ) -> Result<Self, CoordinateParseError> {
        let (lon, lat) = Self::parse_coords(coords)?;
        let datetime = datetime
            .filter(|d| !d.trim().is_empty())
            .map(DateTimeQuery::parse)
            .transpose()?;
        let parameter_names = parameter_name
            .map(Self::parse_parameter_names)
            .filter(|names| !names.is_empty());

        Ok(Self {
            lon,
            lat,
            datetime,
            parameter_names,
        })
    }

    /// Parse a WKT POINT string or a bare coordinate pair.
    ///
    /// Accepts formats:
    /// - `POINT(lon lat)`
    /// - `POINT (lon lat)` (with space)
    /// - Just `lon,lat`
    pub fn parse_coords(coords: &str) -> Result<(f64, f64), CoordinateParseError> {
        let coords = coords.trim();

        if coords.is_empty() {
            return Err(CoordinateParseError::MissingCoordinate("coords".to_string()));
        }

        // Try WKT POINT format
        if coords.to_uppercase().starts_with("POINT") {
            return Self::parse_wkt_point(coords);
        }

        // Try simple lon,lat format
        if coords.contains(',') {
            return Self::parse_simple_coords(coords);
        }

        Err(CoordinateParseError::InvalidWkt(
            "Expected POINT(lon lat) or lon,lat format".to_string(),
        ))
    }

    fn parse_wkt_point(wkt: &str) -> Result<(f64, f64), CoordinateParseError> {
        let start = wkt.find('(').ok_or_else(|| {
            CoordinateParseError::InvalidWkt("Missing opening parenthesis".to_string())
        })?;
        let end = wkt.find(')').ok_or_else(|| {
            CoordinateParseError::InvalidWkt("Missing closing parenthesis".to_string())
        })?;

        if end <= start {
            return Err(CoordinateParseError::InvalidWkt(
                "Invalid parenthesis order".to_string(),
            ));
        }

        // Nothing but whitespace may sit between the keyword and the parenthesis
        let keyword_gap = wkt.get(5..start).map_or(true, |s| !s.trim().is_empty());
        if keyword_gap || !wkt[end + 1..].trim().is_empty() {
            return Err(CoordinateParseError::InvalidWkt(format!(
                "Unexpected text in '{}'",
                wkt
            )));
        }

        let parts: Vec<&str> = wkt[start + 1..end].split_whitespace().collect();
        if parts.len() != 2 {
            return Err(CoordinateParseError::InvalidWkt(format!(
                "Expected 2 coordinates, got {}",
                parts.len()
            )));
        }

        let lon = parse_number(parts[0])?;
        let lat = parse_number(parts[1])?;

        validate_coordinates(lon, lat)?;

        Ok((lon, lat))
    }

    fn parse_simple_coords(coords: &str) -> Result<(f64, f64), CoordinateParseError> {
        let parts: Vec<&str> = coords.split(',').collect();
        if parts.len() != 2 {
            return Err(CoordinateParseError::InvalidWkt(format!(
                "Expected lon,lat format, got {} parts",
                parts.len()
            )));
        }

        let lon = parse_number(parts[0])?;
        let lat = parse_number(parts[1])?;

        validate_coordinates(lon, lat)?;

        Ok((lon, lat))
    }

    /// Parse parameter-name query parameter.
    pub fn parse_parameter_names(param: &str) -> Vec<String> {
        param
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

fn parse_number(raw: &str) -> Result<f64, CoordinateParseError> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| CoordinateParseError::InvalidCoordinate(raw.trim().to_string()))?;
    if !value.is_finite() {
        return Err(CoordinateParseError::InvalidCoordinate(raw.trim().to_string()));
    }
    Ok(value)
}

/// Check that a longitude/latitude pair is inside `[-180, 180]` x `[-90, 90]`.
pub fn validate_coordinates(lon: f64, lat: f64) -> Result<(), CoordinateParseError> {
    if !(-180.0..=180.0).contains(&lon) {
        return Err(CoordinateParseError::OutOfRange(format!(
            "Longitude {} is out of range [-180, 180]",
            lon
        )));
    }

    if !(-90.0..=90.0).contains(&lat) {
        return Err(CoordinateParseError::OutOfRange(format!(
            "Latitude {} is out of range [-90, 90]",
            lat
        )));
    }

    Ok(())
}

/// Datetime query specification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum DateTimeQuery {
    /// A specific instant.
    Instant(DateTime<Utc>),

    /// Multiple specific instants (comma-separated list).
    List(Vec<DateTime<Utc>>),

    /// An interval with optional open ends.
    Interval {
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    },
}

impl DateTimeQuery {
    /// Parse a single ISO 8601 timestamp into UTC.
    ///
    /// Offsets are honoured; timestamps without an offset and bare dates are
    /// taken as UTC.
    pub fn parse_instant(dt: &str) -> Result<DateTime<Utc>, CoordinateParseError> {
        let dt = dt.trim();

        if let Ok(parsed) = DateTime::parse_from_rfc3339(dt) {
            return Ok(parsed.with_timezone(&Utc));
        }

        for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(dt, format) {
                return Ok(naive.and_utc());
            }
        }

        if let Ok(date) = NaiveDate::parse_from_str(dt, "%Y-%m-%d") {
            if let Some(naive) = date.and_hms_opt(0, 0, 0) {
                return Ok(naive.and_utc());
            }
        }

        Err(CoordinateParseError::InvalidDateTime(format!(
            "Invalid datetime format '{}'. Expected ISO 8601 format (e.g., 2024-12-29T12:00:00Z)",
            dt
        )))
    }

    /// Parse a datetime parameter.
    ///
    /// Accepts formats:
    /// - Instant: `2024-12-29T12:00:00Z`
    /// - List: `2024-12-29T12:00:00Z,2024-12-29T13:00:00Z`
    /// - Interval: `2024-12-29T00:00:00Z/2024-12-29T23:59:59Z`
    /// - Open start: `../2024-12-29T23:59:59Z`
    /// - Open end: `2024-12-29T00:00:00Z/..`
    pub fn parse(datetime: &str) -> Result<Self, CoordinateParseError> {
        let datetime = datetime.trim();

        if datetime.contains('/') {
            if datetime.contains(',') {
                return Err(CoordinateParseError::InvalidDateTime(
                    "Intervals cannot be combined with lists".to_string(),
                ));
            }
            let parts: Vec<&str> = datetime.split('/').collect();
            if parts.len() != 2 {
                return Err(CoordinateParseError::InvalidDateTime(
                    "Invalid datetime interval format".to_string(),
                ));
            }

            let bound = |part: &str| -> Result<Option<DateTime<Utc>>, CoordinateParseError> {
                let part = part.trim();
                if part == ".." || part.is_empty() {
                    Ok(None)
                } else {
                    Self::parse_instant(part).map(Some)
                }
            };
            let start = bound(parts[0])?;
            let end = bound(parts[1])?;

            if let (Some(s), Some(e)) = (start, end) {
                if s > e {
                    return Err(CoordinateParseError::InvalidDateTime(format!(
                        "Interval start {} is after end {}",
                        parts[0], parts[1]
                    )));
                }
            }

            return Ok(DateTimeQuery::Interval { start, end });
        }

        if datetime.contains(',') {
            let mut times = datetime
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(Self::parse_instant)
                .collect::<Result<Vec<_>, _>>()?;

            return match times.len() {
                0 => Err(CoordinateParseError::InvalidDateTime(
                    "Empty datetime list".to_string(),
                )),
                1 => Ok(DateTimeQuery::Instant(times.remove(0))),
                _ => Ok(DateTimeQuery::List(times)),
            };
        }

        Ok(DateTimeQuery::Instant(Self::parse_instant(datetime)?))
    }
}

/// Bounding box query parameters (for area queries).
///
/// `west > east` describes a box that crosses the antimeridian.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BboxQuery {
    /// Western longitude.
    pub west: f64,

    /// Southern latitude.
    pub south: f64,

    /// Eastern longitude.
    pub east: f64,

    /// Northern latitude.
    pub north: f64,
}

impl BboxQuery {
    /// Parse a bbox parameter.
    ///
    /// Format: `west,south,east,north`
    pub fn parse(bbox: &str) -> Result<Self, CoordinateParseError> {
        let parts: Vec<&str> = bbox.split(',').collect();
        if parts.len() != 4 {
            return Err(CoordinateParseError::InvalidWkt(format!(
                "Expected 4 values for bbox, got {}",
                parts.len()
            )));
        }

        let west = parse_number(parts[0])?;
        let south = parse_number(parts[1])?;
        let east = parse_number(parts[2])?;
        let north = parse_number(parts[3])?;

        validate_coordinates(west, south)?;
        validate_coordinates(east, north)?;

        if south > north {
            return Err(CoordinateParseError::OutOfRange(
                "South must be less than or equal to north".to_string(),
            ));
        }

        Ok(BboxQuery {
            west,
            south,
            east,
            north,
        })
    }

    /// Whether the box wraps across the 180th meridian.
    pub fn crosses_antimeridian(&self) -> bool {
        self.west > self.east
    }
}

/// Area query parameters (polygon-based spatial query).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AreaQuery {
    /// Polygon coordinates as a ring of (lon, lat) points.
    pub polygon: Vec<(f64, f64)>,
}

impl AreaQuery {
    /// Parse a WKT POLYGON string.
    ///
    /// Accepts format: `POLYGON((lon1 lat1, lon2 lat2, lon3 lat3, lon1 lat1))`
    ///
    /// Envelope and containment are planar in lon/lat, so a ring with an
    /// edge spanning more than 180 degrees of longitude (one that would wrap
    /// across the antimeridian) is rejected. A bbox with `west > east`
    /// covers that case.
    pub fn parse_polygon(coords: &str) -> Result<Self, CoordinateParseError> {
        let coords = coords.trim();

        if !coords.to_uppercase().starts_with("POLYGON") {
            return Err(CoordinateParseError::InvalidWkt(
                "Expected POLYGON format".to_string(),
            ));
        }

        let start = coords.find("((").ok_or_else(|| {
            CoordinateParseError::InvalidWkt("Missing opening parentheses".to_string())
        })?;
        let end = coords.rfind("))").ok_or_else(|| {
            CoordinateParseError::InvalidWkt("Missing closing parentheses".to_string())
        })?;

        if end <= start {
            return Err(CoordinateParseError::InvalidWkt(
                "Invalid parenthesis order".to_string(),
            ));
        }

        let polygon = coords[start + 2..end]
            .split(',')
            .map(|pair| {
                let parts: Vec<&str> = pair.split_whitespace().collect();
                if parts.len() != 2 {
                    return Err(CoordinateParseError::InvalidWkt(format!(
                        "Expected 'lon lat' pair, got '{}'",
                        pair.trim()
                    )));
                }
                let lon = parse_number(parts[0])?;
                let lat = parse_number(parts[1])?;
                validate_coordinates(lon, lat)?;
                Ok((lon, lat))
            })
            .collect::<Result<Vec<_>, _>>()?;

        if polygon.len() < 4 {
            return Err(CoordinateParseError::InvalidWkt(
                "Polygon must have at least 4 points (closed ring)".to_string(),
            ));
        }
        if polygon.first() != polygon.last() {
            return Err(CoordinateParseError::InvalidWkt(
                "Polygon ring must be closed".to_string(),
            ));
        }
        if polygon.windows(2).any(|edge| (edge[1].0 - edge[0].0).abs() > 180.0) {
            return Err(CoordinateParseError::OutOfRange(
                "Polygon crosses the antimeridian; use a bbox with west > east".to_string(),
            ));
        }

        Ok(Self { polygon })
    }

    /// Calculate the bounding box of the polygon.
    pub fn bbox(&self) -> BboxQuery {
        let mut west = f64::MAX;
        let mut south = f64::MAX;
        let mut east = f64::MIN;
        let mut north = f64::MIN;

        for (lon, lat) in &self.polygon {
            west = west.min(*lon);
            east = east.max(*lon);
            south = south.min(*lat);
            north = north.max(*lat);
        }

        BboxQuery {
            west,
            south,
            east,
            north,
        }
    }

    /// Check if a point is inside the polygon using ray casting algorithm.
    pub fn contains_point(&self, lon: f64, lat: f64) -> bool {
        let n = self.polygon.len();
        if n < 3 {
            return false;
        }

        let mut inside = false;
        let mut j = n - 1;

        for i in 0..n {
            let (xi, yi) = self.polygon[i];
            let (xj, yj) = self.polygon[j];

            if ((yi > lat) != (yj > lat)) && (lon < (xj - xi) * (lat - yi) / (yj - yi) + xi) {
                inside = !inside;
            }
            j = i;
        }

        inside
    }
}

/// The spatial part of an area request: a bbox or a polygon.
#[derive(Debug, Clone, PartialEq)]
pub enum AreaGeometry {
    /// Axis-aligned box, possibly crossing the antimeridian.
    Bbox(BboxQuery),
    /// Polygon, queried through its envelope and filtered by containment.
    Polygon(AreaQuery),
}

impl AreaGeometry {
    /// Parse either a WKT POLYGON or a `west,south,east,north` bbox.
    pub fn parse(coords: &str) -> Result<Self, CoordinateParseError> {
        if coords.trim().to_uppercase().starts_with("POLYGON") {
            AreaQuery::parse_polygon(coords).map(AreaGeometry::Polygon)
        } else {
            BboxQuery::parse(coords).map(AreaGeometry::Bbox)
        }
    }

    /// Bounding envelope of the geometry.
    pub fn envelope(&self) -> BboxQuery {
        match self {
            AreaGeometry::Bbox(b) => *b,
            AreaGeometry::Polygon(p) => p.bbox(),
        }
    }

    /// Whether a cell center belongs to the requested area.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        match self {
            AreaGeometry::Bbox(_) => true,
            AreaGeometry::Polygon(p) => p.contains_point(lon, lat),
        }
    }
}
