//! Conversion of query results and versions into EDR documents.

use edr_protocol::{
    Collection, EdrFeature, EdrFeatureCollection, EdrProperties, Extent, Instance, Parameter,
    ParameterValue, TemporalExtent,
};
use grid_processor::{DatasetExtent, VariableInfo};
use storage::{DatasetVersion, VersionListing};

use super::{format_instant, QueryResult};

/// GeoJSON FeatureCollection for a position or area result.
pub fn feature_collection(result: &QueryResult) -> EdrFeatureCollection {
    let features = result
        .features
        .iter()
        .enumerate()
        .map(|(i, feature)| {
            let mut properties = EdrProperties::default()
                .with_datetime(format_instant(feature.time))
                .with_resolution(feature.resolution.as_str());
            for (name, value) in &feature.values {
                let unit = result
                    .parameters
                    .get(name)
                    .map(|info| info.units.as_str())
                    .unwrap_or_default();
                properties = properties.with_parameter(
                    name,
                    ParameterValue::with_unit(value.map(f64::from), unit),
                );
            }
            EdrFeature::point(feature.lon, feature.lat)
                .with_id(i.to_string())
                .with_properties(properties)
        })
        .collect();

    EdrFeatureCollection::new().with_features(features)
}

/// Collection document for the active version of a dataset.
pub fn collection(version: &DatasetVersion, base_url: &str) -> Collection {
    let manifest = version.manifest();
    let mut collection = Collection::new(version.dataset_id())
        .with_title(
            manifest
                .title
                .clone()
                .unwrap_or_else(|| version.dataset_id().to_string()),
        )
        .with_extent(extent(version.extent()))
        .with_parameters(
            manifest
                .variables
                .iter()
                .map(|(name, info)| parameter(name, info)),
        );
    if let Some(reference_time) = manifest.reference_time {
        collection = collection.with_description(format!(
            "Forecast cycle {}, version {}",
            format_instant(reference_time),
            version.version_id()
        ));
    }
    collection.build_links(base_url);
    collection
}

/// Instance document for one retained version.
pub fn instance(listing: &VersionListing, base_url: &str) -> Instance {
    let version = &listing.version;
    let title = match version.manifest().reference_time {
        Some(t) => format!("Forecast cycle {}", format_instant(t)),
        None => format!("Version {}", version.version_id()),
    };
    let mut instance = Instance::new(version.version_id())
        .with_title(title)
        .with_extent(extent(version.extent()))
        .with_active(listing.active);
    instance.build_links(base_url, version.dataset_id());
    instance
}

/// EDR extent with every available instant listed.
pub fn extent(extent: &DatasetExtent) -> Extent {
    let bbox = &extent.bbox;
    let temporal = &extent.temporal;
    Extent::with_spatial([bbox.min_lon, bbox.min_lat, bbox.max_lon, bbox.max_lat]).with_temporal(
        TemporalExtent::new(
            Some(format_instant(temporal.start)),
            Some(format_instant(temporal.end)),
        )
        .with_values(temporal.instants.iter().copied().map(format_instant).collect()),
    )
}

fn parameter(name: &str, info: &VariableInfo) -> Parameter {
    let label = if info.title.is_empty() {
        name
    } else {
        info.title.as_str()
    };
    let parameter = Parameter::new(name, label)
        .with_description(info.description.as_str())
        .with_standard_name(info.standard_name.as_str());
    if info.units.is_empty() {
        parameter
    } else {
        parameter.with_unit_symbol(info.units.as_str())
    }
}
