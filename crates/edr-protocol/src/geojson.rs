//! EDR GeoJSON types for query responses.
//!
//! Position and area queries answer with an EDR GeoJSON FeatureCollection:
//! one Point feature per (grid cell, instant) pair.
//!
//! See: <https://www.opengis.net/spec/ogcapi-edr-1/1.1/req/edr-geojson>

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A GeoJSON FeatureCollection for EDR responses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EdrFeatureCollection {
    /// Type identifier (always "FeatureCollection").
    #[serde(rename = "type")]
    pub type_: String,

    /// Array of features.
    pub features: Vec<EdrFeature>,

    /// Number of features in this response.
    #[serde(rename = "numberReturned")]
    pub number_returned: usize,
}

impl EdrFeatureCollection {
    /// Create a new empty FeatureCollection.
    pub fn new() -> Self {
        Self {
            type_: "FeatureCollection".to_string(),
            features: Vec::new(),
            number_returned: 0,
        }
    }

    /// Add multiple features to the collection.
    pub fn with_features(mut self, features: Vec<EdrFeature>) -> Self {
        self.features.extend(features);
        self.number_returned = self.features.len();
        self
    }
}

impl Default for EdrFeatureCollection {
    fn default() -> Self {
        Self::new()
    }
}

/// A GeoJSON Feature for EDR responses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EdrFeature {
    /// Type identifier (always "Feature").
    #[serde(rename = "type")]
    pub type_: String,

    /// Optional feature identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// The geometry of this feature.
    pub geometry: EdrGeometry,

    /// Properties containing parameter values and metadata.
    pub properties: EdrProperties,
}

impl EdrFeature {
    /// Create a new feature with a point geometry.
    pub fn point(lon: f64, lat: f64) -> Self {
        Self {
            type_: "Feature".to_string(),
            id: None,
            geometry: EdrGeometry::Point {
                coordinates: [lon, lat],
            },
            properties: EdrProperties::default(),
        }
    }

    /// Set the feature ID.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the properties.
    pub fn with_properties(mut self, properties: EdrProperties) -> Self {
        self.properties = properties;
        self
    }
}

/// GeoJSON geometry types produced by this service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum EdrGeometry {
    /// A point geometry.
    Point {
        /// Coordinates as [longitude, latitude].
        coordinates: [f64; 2],
    },
}

/// Properties for an EDR GeoJSON feature.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct EdrProperties {
    /// Datetime of the forecast step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,

    /// How the requested coordinate mapped onto the grid ("exact" or "nearest").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,

    /// Parameter values.
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterValue>,
}

impl EdrProperties {
    /// Set the datetime.
    pub fn with_datetime(mut self, datetime: impl Into<String>) -> Self {
        self.datetime = Some(datetime.into());
        self
    }

    /// Set the resolution flag.
    pub fn with_resolution(mut self, resolution: impl Into<String>) -> Self {
        self.resolution = Some(resolution.into());
        self
    }

    /// Add a parameter value.
    pub fn with_parameter(mut self, name: impl Into<String>, value: ParameterValue) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }
}

/// A parameter value in GeoJSON properties.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParameterValue {
    /// The numeric value (null if missing).
    pub value: Option<f64>,

    /// Unit of measurement.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl ParameterValue {
    /// Create a parameter value with unit.
    pub fn with_unit(value: Option<f64>, unit: impl Into<String>) -> Self {
        let unit = unit.into();
        Self {
            value,
            unit: (!unit.is_empty()).then_some(unit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_serialization() {
        let feature = EdrFeature::point(-140.0, 30.0).with_id("0").with_properties(
            EdrProperties::default()
                .with_datetime("2024-01-01T00:00:00Z")
                .with_resolution("exact")
                .with_parameter("htsgwsfc", ParameterValue::with_unit(Some(2.5), "m"))
                .with_parameter("perpwsfc", ParameterValue::with_unit(None, "")),
        );
        let fc = EdrFeatureCollection::new().with_features(vec![feature]);

        let json = serde_json::to_value(&fc).unwrap();
        assert_eq!(json["type"], "FeatureCollection");
        assert_eq!(json["numberReturned"], 1);
        let f = &json["features"][0];
        assert_eq!(f["geometry"]["type"], "Point");
        assert_eq!(f["geometry"]["coordinates"][0], -140.0);
        assert_eq!(f["properties"]["resolution"], "exact");
        assert_eq!(f["properties"]["parameters"]["htsgwsfc"]["value"], 2.5);
        assert!(f["properties"]["parameters"]["perpwsfc"]["value"].is_null());
        assert!(f["properties"]["parameters"]["perpwsfc"].get("unit").is_none());
    }

    #[test]
    fn test_empty_collection() {
        let fc = EdrFeatureCollection::default();
        let json = serde_json::to_string(&fc).unwrap();
        assert!(json.contains("\"features\":[]"));
        assert!(json.contains("\"numberReturned\":0"));
    }
}
