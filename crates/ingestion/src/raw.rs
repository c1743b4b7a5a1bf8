//! Raw forecast documents as delivered by a source.
//!
//! A raw grid is whatever the upstream produced: dimensions in any order and
//! under any of the usual names, longitudes in either convention, fill values
//! instead of missing data. Nothing here is validated beyond deserialization;
//! that is the normalizer's job.
//!
//! ```json
//! {
//!   "dims": ["lat", "lon", "time"],
//!   "coords": { "time": ["2024-01-01T00:00:00Z"], "lat": [0.0], "lon": [0.0] },
//!   "lon_convention": "0-360",
//!   "reference_time": "2024-01-01T00:00:00Z",
//!   "attributes": { "title": "GFS Wave" },
//!   "variables": {
//!     "htsgwsfc": { "data": [1.5], "fill_value": 9.999e20, "units": "m" }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Canonical axis of a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Axis {
    Time,
    Lat,
    Lon,
}

impl Axis {
    /// Resolve a dimension name, case-insensitively.
    pub fn from_dim_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "time" | "t" => Some(Self::Time),
            "lat" | "latitude" | "y" => Some(Self::Lat),
            "lon" | "longitude" | "x" => Some(Self::Lon),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Time => "time",
            Self::Lat => "lat",
            Self::Lon => "lon",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Longitude convention of the raw longitude axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LonConvention {
    /// [-180, 180]
    #[serde(rename = "signed", alias = "-180-180")]
    Signed,
    /// [0, 360)
    #[serde(rename = "0-360", alias = "positive")]
    ZeroTo360,
    /// Decide from the values: anything above 180 means 0-360.
    #[default]
    #[serde(rename = "auto")]
    Auto,
}

impl LonConvention {
    /// The effective convention for a given axis.
    pub fn resolve(self, lons: &[f64]) -> Self {
        match self {
            Self::Auto if lons.iter().any(|&l| l > 180.0) => Self::ZeroTo360,
            Self::Auto => Self::Signed,
            other => other,
        }
    }
}

/// A coordinate value: a number, or a timestamp string for the time axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CoordValue {
    Number(f64),
    Text(String),
}

impl CoordValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Interpret as an instant.
    ///
    /// Numbers are epoch seconds. Strings are RFC 3339, or naive date-times
    /// and dates which are taken as UTC.
    pub fn as_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Number(v) if v.is_finite() => {
                let secs = v.trunc() as i64;
                let nanos = ((v - v.trunc()) * 1e9).round() as u32;
                Utc.timestamp_opt(secs, nanos).single()
            }
            Self::Number(_) => None,
            Self::Text(s) => parse_time(s),
        }
    }
}

/// Parse a timestamp string; naive values are UTC.
pub fn parse_time(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// One variable of a raw grid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawVariable {
    /// Flat values in `dims` order. `null` is read as missing.
    pub data: Vec<Option<f32>>,
    #[serde(default, alias = "_FillValue", alias = "missing_value")]
    pub fill_value: Option<f64>,
    #[serde(default)]
    pub units: Option<String>,
    #[serde(default, alias = "title")]
    pub long_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub standard_name: Option<String>,
}

impl RawVariable {
    /// Whether a raw value stands for missing data.
    pub fn is_missing(&self, value: Option<f32>) -> bool {
        match value {
            None => true,
            Some(v) if !v.is_finite() => true,
            Some(v) => self
                .fill_value
                .map_or(false, |fill| v == fill as f32 || (v as f64 - fill).abs() <= fill.abs() * 1e-6),
        }
    }
}

/// A forecast as fetched, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawGrid {
    /// Dimension names in storage order (outermost first).
    pub dims: Vec<String>,
    /// Coordinate arrays keyed by dimension name.
    pub coords: BTreeMap<String, Vec<CoordValue>>,
    #[serde(default)]
    pub lon_convention: LonConvention,
    #[serde(default)]
    pub reference_time: Option<CoordValue>,
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
    pub variables: BTreeMap<String, RawVariable>,
}

impl RawGrid {
    /// Coordinates of a canonical axis, looked up through the dimension aliases.
    pub fn coords_for(&self, axis: Axis) -> Option<&[CoordValue]> {
        self.coords
            .iter()
            .find(|(name, _)| Axis::from_dim_name(name) == Some(axis))
            .map(|(_, values)| values.as_slice())
    }

    /// Forecast cycle time, if the document carries one.
    pub fn reference_time(&self) -> Option<DateTime<Utc>> {
        self.reference_time.as_ref().and_then(CoordValue::as_time)
    }

    /// Human-readable title from the global attributes.
    pub fn title(&self) -> Option<&str> {
        self.attributes.get("title").and_then(|v| v.as_str())
    }
}
