//! EDR Collection types.
//!
//! A collection is one dataset id; each retained dataset version is exposed
//! as an instance of that collection.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::parameters::Parameter;
use crate::types::{Extent, Link, CRS84};

/// Output formats accepted by the `f` query parameter.
pub const OUTPUT_FORMATS: &[&str] = &["GeoJSON"];

/// A list of collections available from the EDR API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollectionList {
    /// Links to related resources.
    pub links: Vec<Link>,

    /// The collections.
    pub collections: Vec<Collection>,
}

impl CollectionList {
    /// Create a new collection list.
    pub fn new(collections: Vec<Collection>, base_url: &str) -> Self {
        Self {
            links: vec![Link::new(format!("{}/collections", base_url), "self")
                .with_type("application/json")],
            collections,
        }
    }
}

/// An EDR collection representing a dataset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Collection {
    /// Unique identifier for the collection.
    pub id: String,

    /// Human-readable title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Detailed description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Links to related resources.
    pub links: Vec<Link>,

    /// Spatial and temporal extent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extent: Option<Extent>,

    /// Available query types and their links.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_queries: Option<DataQueries>,

    /// Coordinate reference systems supported.
    pub crs: Vec<String>,

    /// Output formats supported.
    pub output_formats: Vec<String>,

    /// Parameters available in this collection.
    #[serde(rename = "parameter_names")]
    pub parameter_names: BTreeMap<String, Parameter>,
}

impl Collection {
    /// Create a new collection with required fields.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            description: None,
            links: Vec::new(),
            extent: None,
            data_queries: None,
            crs: vec![CRS84.to_string()],
            output_formats: OUTPUT_FORMATS.iter().map(|f| f.to_string()).collect(),
            parameter_names: BTreeMap::new(),
        }
    }

    /// Set the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the extent.
    pub fn with_extent(mut self, extent: Extent) -> Self {
        self.extent = Some(extent);
        self
    }

    /// Set the parameters.
    pub fn with_parameters(mut self, params: impl IntoIterator<Item = Parameter>) -> Self {
        self.parameter_names = params.into_iter().map(|p| (p.id.clone(), p)).collect();
        self
    }

    /// Build standard links and data query descriptions for a collection.
    pub fn build_links(&mut self, base_url: &str) {
        let collection_url = format!("{}/collections/{}", base_url, self.id);
        self.links = vec![
            Link::new(&collection_url, "self").with_type("application/json"),
            Link::new(base_url, "root").with_type("application/json"),
            Link::new(format!("{}/instances", collection_url), "instances")
                .with_type("application/json")
                .with_title("Dataset versions"),
        ];
        self.data_queries = Some(DataQueries::for_collection(&collection_url));
    }
}

/// Supported data query types for a collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DataQueries {
    /// Position query (point sampling).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<QueryDescription>,

    /// Area query (bbox or polygon sampling).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area: Option<QueryDescription>,

    /// Instances listing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instances: Option<QueryDescription>,
}

impl DataQueries {
    /// Position, area and instances for a collection or instance URL.
    pub fn for_collection(url: &str) -> Self {
        let describe = |path: &str, title: &str| QueryDescription {
            link: Link::new(format!("{}/{}", url, path), "data")
                .with_type(crate::media_types::GEO_JSON)
                .with_title(title),
        };
        Self {
            position: Some(describe("position", "Position query")),
            area: Some(describe("area", "Area query")),
            instances: Some(describe("instances", "Instances")),
        }
    }
}

/// Description of a query endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryDescription {
    /// Link to the query endpoint.
    pub link: Link,
}

/// A list of instances (dataset versions) for a collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstanceList {
    /// Links to related resources.
    pub links: Vec<Link>,

    /// The instances.
    pub instances: Vec<Instance>,
}

impl InstanceList {
    /// Create a new instance list.
    pub fn new(instances: Vec<Instance>, base_url: &str, collection_id: &str) -> Self {
        Self {
            links: vec![
                Link::new(
                    format!("{}/collections/{}/instances", base_url, collection_id),
                    "self",
                )
                .with_type("application/json"),
                Link::new(
                    format!("{}/collections/{}", base_url, collection_id),
                    "collection",
                )
                .with_type("application/json"),
            ],
            instances,
        }
    }
}

/// An instance is one ingested version of a collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instance {
    /// Version identifier.
    pub id: String,

    /// Human-readable title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Whether this version currently serves collection-level queries.
    pub active: bool,

    /// Links to related resources.
    pub links: Vec<Link>,

    /// Extent of this version, including its discrete time values.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extent: Option<Extent>,

    /// Data queries available for this instance.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_queries: Option<DataQueries>,
}

impl Instance {
    /// Create a new instance.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            active: false,
            links: Vec::new(),
            extent: None,
            data_queries: None,
        }
    }

    /// Set the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the extent.
    pub fn with_extent(mut self, extent: Extent) -> Self {
        self.extent = Some(extent);
        self
    }

    /// Mark whether this is the active version.
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Build standard links for an instance.
    pub fn build_links(&mut self, base_url: &str, collection_id: &str) {
        let instance_url = format!(
            "{}/collections/{}/instances/{}",
            base_url, collection_id, self.id
        );
        self.links = vec![
            Link::new(&instance_url, "self").with_type("application/json"),
            Link::new(
                format!("{}/collections/{}", base_url, collection_id),
                "collection",
            )
            .with_type("application/json"),
        ];
        let mut queries = DataQueries::for_collection(&instance_url);
        queries.instances = None;
        self.data_queries = Some(queries);
    }
}
