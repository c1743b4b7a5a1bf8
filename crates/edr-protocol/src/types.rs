//! Core EDR types used across the API.

use serde::{Deserialize, Serialize};

/// Default horizontal CRS for all collections.
pub const CRS84: &str = "CRS:84";

/// A hyperlink to a related resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Link {
    /// The URI of the linked resource.
    pub href: String,

    /// The relationship type (e.g., "self", "data").
    pub rel: String,

    /// The media type of the linked resource.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,

    /// A human-readable title for the link.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Link {
    /// Create a new link with required fields.
    pub fn new(href: impl Into<String>, rel: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            rel: rel.into(),
            type_: None,
            title: None,
        }
    }

    /// Set the media type.
    pub fn with_type(mut self, type_: impl Into<String>) -> Self {
        self.type_ = Some(type_.into());
        self
    }

    /// Set the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// The spatial and temporal extent of a collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Extent {
    /// The spatial extent of the collection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spatial: Option<SpatialExtent>,

    /// The temporal extent of the collection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporal: Option<TemporalExtent>,
}

impl Extent {
    /// Create an extent with spatial bounds `[west, south, east, north]`.
    ///
    /// A box with `west > east` crosses the antimeridian, as allowed by
    /// OGC API Common.
    pub fn with_spatial(bbox: [f64; 4]) -> Self {
        Self {
            spatial: Some(SpatialExtent {
                bbox: vec![bbox.to_vec()],
                crs: CRS84.to_string(),
            }),
            temporal: None,
        }
    }

    /// Add temporal extent to this extent (builder pattern).
    pub fn with_temporal(mut self, temporal: TemporalExtent) -> Self {
        self.temporal = Some(temporal);
        self
    }
}

/// Spatial extent with bounding box.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpatialExtent {
    /// Bounding boxes as [west, south, east, north] arrays.
    pub bbox: Vec<Vec<f64>>,

    /// Coordinate reference system (default: CRS:84).
    #[serde(default = "default_crs")]
    pub crs: String,
}

fn default_crs() -> String {
    CRS84.to_string()
}

/// Temporal extent with time intervals.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemporalExtent {
    /// Time intervals as [start, end] pairs (ISO 8601).
    pub interval: Vec<Vec<Option<String>>>,

    /// Available time values (ISO 8601 timestamps).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,

    /// Temporal reference system (default: Gregorian).
    #[serde(default = "default_trs")]
    pub trs: String,
}

fn default_trs() -> String {
    "TIMECRS[\"DateTime\",TDATUM[\"Gregorian Calendar\"],CS[TemporalDateTime,1],AXIS[\"Time (T)\",future]]".to_string()
}

impl TemporalExtent {
    /// Create a temporal extent from start and end times.
    pub fn new(start: Option<String>, end: Option<String>) -> Self {
        Self {
            interval: vec![vec![start, end]],
            values: None,
            trs: default_trs(),
        }
    }

    /// Add available time values.
    pub fn with_values(mut self, values: Vec<String>) -> Self {
        self.values = Some(values);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_serialization() {
        let link = Link::new("http://example.com", "self").with_type("application/json");

        let json = serde_json::to_string(&link).unwrap();
        assert!(json.contains("\"href\":\"http://example.com\""));
        assert!(json.contains("\"type\":\"application/json\""));
        assert!(!json.contains("\"title\""));
    }

    #[test]
    fn test_extent_antimeridian_bbox_kept_as_is() {
        let extent = Extent::with_spatial([170.0, -10.0, -170.0, 10.0]);
        let spatial = extent.spatial.unwrap();
        assert_eq!(spatial.bbox, vec![vec![170.0, -10.0, -170.0, 10.0]]);
        assert_eq!(spatial.crs, "CRS:84");
    }

    #[test]
    fn test_temporal_extent_values() {
        let extent = TemporalExtent::new(
            Some("2024-01-01T00:00:00Z".to_string()),
            Some("2024-01-02T00:00:00Z".to_string()),
        )
        .with_values(vec!["2024-01-01T00:00:00Z".to_string()]);

        let json = serde_json::to_value(&extent).unwrap();
        assert_eq!(json["interval"][0][1], "2024-01-02T00:00:00Z");
        assert_eq!(json["values"][0], "2024-01-01T00:00:00Z");
        assert!(json["trs"].as_str().unwrap().contains("Gregorian"));
    }
}
