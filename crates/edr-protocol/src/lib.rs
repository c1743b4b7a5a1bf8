//! OGC API - Environmental Data Retrieval (EDR) Protocol
//!
//! Wire types and query-parameter parsing for the wave forecast EDR service.
//! It follows the OGC API - Environmental Data Retrieval specification v1.1.
//!
//! # Conformance Classes
//!
//! This implementation targets the following conformance classes:
//! - Core
//! - Collections
//! - Position Query
//! - Area Query
//! - Instances
//! - GeoJSON output
//!
//! # Example
//!
//! ```rust
//! use edr_protocol::{BboxQuery, PositionQuery};
//!
//! let (lon, lat) = PositionQuery::parse_coords("POINT(-140 30)").unwrap();
//! assert_eq!((lon, lat), (-140.0, 30.0));
//!
//! let bbox = BboxQuery::parse("170,-10,-170,10").unwrap();
//! assert!(bbox.crosses_antimeridian());
//! ```

pub mod collections;
pub mod errors;
pub mod geojson;
pub mod parameters;
pub mod queries;
pub mod responses;
pub mod types;

// Re-export commonly used types
pub use collections::{Collection, CollectionList, DataQueries, Instance, InstanceList};
pub use errors::EdrError;
pub use geojson::{EdrFeature, EdrFeatureCollection, EdrProperties, ParameterValue};
pub use parameters::{Parameter, Unit};
pub use queries::{
    AreaGeometry, AreaQuery, BboxQuery, CoordinateParseError, DateTimeQuery, PositionQuery,
};
pub use responses::{ConformanceClasses, ExceptionResponse, LandingPage};
pub use types::{Extent, Link, SpatialExtent, TemporalExtent};

/// EDR API conformance class URIs
pub mod conformance {
    /// Core conformance class
    pub const CORE: &str = "http://www.opengis.net/spec/ogcapi-edr-1/1.1/conf/core";
    /// Collections conformance class
    pub const COLLECTIONS: &str = "http://www.opengis.net/spec/ogcapi-edr-1/1.1/conf/collections";
    /// Position query conformance class
    pub const POSITION: &str = "http://www.opengis.net/spec/ogcapi-edr-1/1.1/conf/position";
    /// Area query conformance class
    pub const AREA: &str = "http://www.opengis.net/spec/ogcapi-edr-1/1.1/conf/area";
    /// Instances conformance class
    pub const INSTANCES: &str = "http://www.opengis.net/spec/ogcapi-edr-1/1.1/conf/instances";
    /// CoverageJSON conformance class
    pub const COVJSON: &str = "http://www.opengis.net/spec/ogcapi-edr-1/1.1/conf/covjson";
    /// GeoJSON conformance class
    pub const GEOJSON: &str = "http://www.opengis.net/spec/ogcapi-edr-1/1.1/conf/geojson";
}

/// Media types used in EDR responses
pub mod media_types {
    /// GeoJSON media type
    pub const GEO_JSON: &str = "application/geo+json";
    /// JSON media type
    pub const JSON: &str = "application/json";
}
