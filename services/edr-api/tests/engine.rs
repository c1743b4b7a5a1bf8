//! Query engine scenarios against versions published into a real registry.

use chrono::Duration;
use edr_api::config::LimitsConfig;
use edr_api::engine::{AreaRequest, QueryEngine, QueryError, Resolution};
use edr_protocol::PositionQuery;
use grid_processor::GridReader;
use test_utils::{
    bbox, cell_value, pacific_grid, publish_active, publish_version, reference_time,
    regional_grid, temp_registry, variable_value, DATASET_ID,
};

fn bbox_coords((w, s, e, n): (f64, f64, f64, f64)) -> String {
    format!("{},{},{},{}", w, s, e, n)
}

fn position(coords: &str, datetime: Option<&str>, parameters: Option<&str>) -> PositionQuery {
    PositionQuery::parse(coords, datetime, parameters).unwrap()
}

#[tokio::test]
async fn test_position_exact_round_trip() {
    let (_dir, registry) = temp_registry();
    let version = publish_active(&registry, DATASET_ID, &regional_grid(), reference_time());
    let engine = QueryEngine::new(registry, LimitsConfig::default());

    // lon -147 is x = 3, lat 12 is y = 8, 06Z is t = 2
    let result = engine
        .position(
            DATASET_ID,
            &position("-147,12", Some("2024-01-15T06:00:00Z"), None),
        )
        .await
        .unwrap();

    assert_eq!(result.version_id, version.version_id());
    assert_eq!(result.parameters.len(), 3);
    assert_eq!(result.features.len(), 1);

    let feature = &result.features[0];
    assert_eq!((feature.lon, feature.lat), (-147.0, 12.0));
    assert_eq!(feature.time, reference_time() + Duration::hours(6));
    assert_eq!(feature.resolution, Resolution::Exact);
    assert_eq!(feature.values["htsgwsfc"], Some(variable_value(0, 2, 8, 3)));
    assert_eq!(feature.values["perpwsfc"], Some(variable_value(1, 2, 8, 3)));
    assert_eq!(feature.values["dirpwsfc"], Some(variable_value(2, 2, 8, 3)));
}

#[tokio::test]
async fn test_position_full_series_and_missing_values() {
    let (_dir, registry) = temp_registry();
    publish_active(&registry, DATASET_ID, &regional_grid(), reference_time());
    let engine = QueryEngine::new(registry, LimitsConfig::default());

    // Near the (0, 0) cell, which is missing at t = 0
    let result = engine
        .position(DATASET_ID, &position("-149.8,19.9", None, Some("htsgwsfc")))
        .await
        .unwrap();

    assert_eq!(result.features.len(), 4);
    assert_eq!(result.parameters.keys().collect::<Vec<_>>(), vec!["htsgwsfc"]);
    assert!(result
        .features
        .iter()
        .all(|f| f.resolution == Resolution::Nearest && f.lon == -150.0 && f.lat == 20.0));
    assert_eq!(result.features[0].values["htsgwsfc"], None);
    assert_eq!(result.features[1].values["htsgwsfc"], Some(cell_value(1, 0, 0)));
    assert!(result.features.windows(2).all(|w| w[0].time < w[1].time));
}

#[tokio::test]
async fn test_position_midpoint_resolves_to_lower_index() {
    let (_dir, registry) = temp_registry();
    publish_active(&registry, DATASET_ID, &regional_grid(), reference_time());
    let engine = QueryEngine::new(registry, LimitsConfig::default());

    // Halfway between lon -148/-147 and lat 13/12; halfway between 00Z and 03Z
    let result = engine
        .position(
            DATASET_ID,
            &position("-147.5,12.5", Some("2024-01-15T01:30:00Z"), Some("htsgwsfc")),
        )
        .await
        .unwrap();

    let feature = &result.features[0];
    assert_eq!((feature.lon, feature.lat), (-148.0, 13.0));
    assert_eq!(feature.time, reference_time());
    assert_eq!(feature.values["htsgwsfc"], Some(cell_value(0, 7, 2)));
    assert_eq!(feature.resolution, Resolution::Nearest);
}

#[tokio::test]
async fn test_position_outside_extent_is_empty() {
    let (_dir, registry) = temp_registry();
    publish_active(&registry, DATASET_ID, &regional_grid(), reference_time());
    let engine = QueryEngine::new(registry, LimitsConfig::default());

    for coords in ["-139.4,15", "-145,20.6", "0,0"] {
        let result = engine
            .position(DATASET_ID, &position(coords, None, None))
            .await
            .unwrap();
        assert!(result.is_empty(), "{coords} should be outside");
    }

    // Half a cell beyond the edge is still covered
    let result = engine
        .position(DATASET_ID, &position("-139.5,15", None, None))
        .await
        .unwrap();
    assert_eq!(result.features.len(), 4);
}

#[tokio::test]
async fn test_datetime_out_of_range() {
    let (_dir, registry) = temp_registry();
    publish_active(&registry, DATASET_ID, &regional_grid(), reference_time());
    let engine = QueryEngine::new(registry, LimitsConfig::default());

    for datetime in [
        "2024-01-20T00:00:00Z",
        "2024-01-14T23:00:00Z",
        "2024-02-01T00:00:00Z/2024-02-02T00:00:00Z",
    ] {
        let err = engine
            .position(DATASET_ID, &position("-147,12", Some(datetime), None))
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::OutOfRange(_)), "{datetime}: {err}");
    }

    // Intervals select every step they contain
    let result = engine
        .position(
            DATASET_ID,
            &position("-147,12", Some("2024-01-15T02:00:00Z/.."), None),
        )
        .await
        .unwrap();
    assert_eq!(result.features.len(), 3);
}

#[tokio::test]
async fn test_unknown_collection_instance_and_parameter() {
    let (_dir, registry) = temp_registry();
    publish_active(&registry, DATASET_ID, &regional_grid(), reference_time());
    let engine = QueryEngine::new(registry, LimitsConfig::default());
    let query = position("-147,12", None, None);

    let err = engine.position("tides", &query).await.unwrap_err();
    assert!(matches!(err, QueryError::CollectionNotFound(_)));

    let err = engine
        .position_at(DATASET_ID, "20990101T000000Z", &query)
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::InstanceNotFound(_)));

    let err = engine
        .position(DATASET_ID, &position("-147,12", None, Some("sst")))
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::InvalidParameter(_)));
}

#[tokio::test]
async fn test_area_bbox() {
    let (_dir, registry) = temp_registry();
    publish_active(&registry, DATASET_ID, &regional_grid(), reference_time());
    let engine = QueryEngine::new(registry, LimitsConfig::default());

    let request = AreaRequest::parse(
        &bbox_coords(bbox::REGIONAL_INNER),
        Some("2024-01-15T03:00:00Z"),
        Some("htsgwsfc"),
    )
    .unwrap();
    let result = engine.area(DATASET_ID, &request).await.unwrap();

    // lon -148..-146 (x 2..=4) by lat 14..12 (y 6..=8)
    assert_eq!(result.features.len(), 9);
    let first = &result.features[0];
    assert_eq!((first.lon, first.lat), (-148.0, 14.0));
    assert_eq!(first.values["htsgwsfc"], Some(cell_value(1, 6, 2)));
    let last = &result.features[8];
    assert_eq!((last.lon, last.lat), (-146.0, 12.0));
    assert!(result.features.iter().all(|f| f.resolution == Resolution::Exact));
}

#[tokio::test]
async fn test_area_across_antimeridian() {
    let (_dir, registry) = temp_registry();
    publish_active(&registry, DATASET_ID, &pacific_grid(), reference_time());
    let engine = QueryEngine::new(registry, LimitsConfig::default());

    let request = AreaRequest::parse(&bbox_coords(bbox::PACIFIC), None, None).unwrap();
    let result = engine.area(DATASET_ID, &request).await.unwrap();

    // 5 columns (178, 179, -180, -179, -178) x 3 rows x 2 steps
    assert_eq!(result.features.len(), 30);
    let lons: Vec<f64> = result.features[..5].iter().map(|f| f.lon).collect();
    assert_eq!(lons, vec![178.0, 179.0, -180.0, -179.0, -178.0]);
    assert!(result.features[..15]
        .iter()
        .all(|f| f.time == reference_time()));
    assert!(result
        .features
        .iter()
        .all(|f| f.lat >= -1.0 && f.lat <= 1.0 && f.values["htsgwsfc"].is_some()));
}

#[tokio::test]
async fn test_area_outside_and_degenerate() {
    let (_dir, registry) = temp_registry();
    publish_active(&registry, DATASET_ID, &regional_grid(), reference_time());
    let engine = QueryEngine::new(registry, LimitsConfig::default());

    let request = AreaRequest::parse(&bbox_coords(bbox::ATLANTIC), None, None).unwrap();
    assert!(engine.area(DATASET_ID, &request).await.unwrap().is_empty());

    // Smaller than a cell and between centers: the cell nearest its center
    let request =
        AreaRequest::parse("-147.6,12.6,-147.4,12.8", Some("2024-01-15T00:00:00Z"), None)
            .unwrap();
    let result = engine.area(DATASET_ID, &request).await.unwrap();
    assert_eq!(result.features.len(), 1);
    let feature = &result.features[0];
    assert_eq!((feature.lon, feature.lat), (-148.0, 13.0));
    assert_eq!(feature.resolution, Resolution::Nearest);
}

#[tokio::test]
async fn test_area_polygon() {
    let (_dir, registry) = temp_registry();
    publish_active(&registry, DATASET_ID, &regional_grid(), reference_time());
    let engine = QueryEngine::new(registry, LimitsConfig::default());

    // Right triangle with legs along lon -150 and lat 10: 3 + 2 + 1 centers
    let request = AreaRequest::parse(
        "POLYGON((-150.5 9.5, -147.2 9.5, -150.5 12.8, -150.5 9.5))",
        Some("2024-01-15T00:00:00Z"),
        Some("htsgwsfc"),
    )
    .unwrap();
    let result = engine.area(DATASET_ID, &request).await.unwrap();

    let mut cells: Vec<(f64, f64)> = result.features.iter().map(|f| (f.lon, f.lat)).collect();
    cells.sort_by(|a, b| a.partial_cmp(b).unwrap());
    assert_eq!(
        cells,
        vec![
            (-150.0, 10.0),
            (-150.0, 11.0),
            (-150.0, 12.0),
            (-149.0, 10.0),
            (-149.0, 11.0),
            (-148.0, 10.0),
        ]
    );
}

#[tokio::test]
async fn test_area_too_large() {
    let (_dir, registry) = temp_registry();
    publish_active(&registry, DATASET_ID, &regional_grid(), reference_time());
    let limits = LimitsConfig {
        max_cells: 100,
        ..Default::default()
    };
    let engine = QueryEngine::new(registry, limits);

    let request = AreaRequest::parse("-150,10,-140,20", None, None).unwrap();
    let err = engine.area(DATASET_ID, &request).await.unwrap_err();
    assert!(matches!(
        err,
        QueryError::QueryTooLarge {
            cells: 484,
            limit: 100
        }
    ));

    // A single step of a small box fits
    let request =
        AreaRequest::parse("-150,10,-146,14", Some("2024-01-15T00:00:00Z"), None).unwrap();
    assert_eq!(engine.area(DATASET_ID, &request).await.unwrap().features.len(), 25);
}

#[tokio::test]
async fn test_instances_and_version_queries() {
    let (_dir, registry) = temp_registry();
    let t0 = reference_time();
    let v1 = publish_active(&registry, DATASET_ID, &regional_grid(), t0);
    let v2 = publish_version(&registry, DATASET_ID, &regional_grid(), t0 + Duration::hours(6));
    let engine = QueryEngine::new(registry.clone(), LimitsConfig::default());

    // Registered but not promoted: collection queries still read v1
    let query = position("-147,12", Some("2024-01-15T00:00:00Z"), None);
    let result = engine.position(DATASET_ID, &query).await.unwrap();
    assert_eq!(result.version_id, v1.version_id());

    let result = engine
        .position_at(DATASET_ID, v2.version_id(), &query)
        .await
        .unwrap();
    assert_eq!(result.version_id, v2.version_id());

    let instants = engine.instances(DATASET_ID).unwrap();
    assert_eq!(instants.len(), 4);
    assert_eq!(instants[0], t0);

    let versions = engine.versions(DATASET_ID).unwrap();
    assert_eq!(versions.len(), 2);
    assert!(versions[0].active);
    assert!(!versions[1].active);
    assert!(engine.version(DATASET_ID, "20990101T000000Z").is_err());
}

#[tokio::test]
async fn test_prune_while_version_is_pinned() {
    let (_dir, registry) = temp_registry();
    let t0 = reference_time();
    let v1 = publish_active(&registry, DATASET_ID, &regional_grid(), t0);
    let engine = QueryEngine::new(registry.clone(), LimitsConfig::default());

    // Stands in for a query that is still reading v1
    let handle = registry.acquire(DATASET_ID).unwrap();
    let reader = handle.reader().await.unwrap();

    let v2 = publish_active(&registry, DATASET_ID, &regional_grid(), t0 + Duration::hours(6));
    let report = registry.prune(DATASET_ID, 1).unwrap();
    assert_eq!(report.deferred, vec![v1.version_id().to_string()]);
    assert!(v1.dir().exists());

    // The pinned reader still works; new queries see v2 only
    let values = reader.read_cells("htsgwsfc", &[(1, 2, 3)]).await.unwrap();
    assert_eq!(values, vec![cell_value(1, 2, 3)]);
    let query = position("-147,12", None, None);
    let result = engine.position(DATASET_ID, &query).await.unwrap();
    assert_eq!(result.version_id, v2.version_id());
    let err = engine
        .position_at(DATASET_ID, v1.version_id(), &query)
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::InstanceNotFound(_)));

    drop(reader);
    drop(handle);
    assert!(!v1.dir().exists());
}

/// No handle is left on any version, and an older version prunes at once.
fn assert_released_and_prunable(registry: &storage::DatasetRegistry, old: &str) {
    let versions = registry.list(DATASET_ID).unwrap();
    assert!(versions.iter().all(|v| v.in_flight == 0), "{versions:?}");

    publish_active(registry, DATASET_ID, &regional_grid(), reference_time() + Duration::hours(6));
    let report = registry.prune(DATASET_ID, 1).unwrap();
    assert_eq!(report.removed, vec![old.to_string()]);
    assert!(report.deferred.is_empty());
}

#[tokio::test]
async fn test_cancelled_area_query_releases_version() {
    let (_dir, registry) = temp_registry();
    let v1 = publish_active(&registry, DATASET_ID, &regional_grid(), reference_time());
    let engine = QueryEngine::new(registry.clone(), LimitsConfig::default());

    let request = AreaRequest::parse(&bbox_coords(bbox::REGIONAL_INNER), None, None).unwrap();
    tokio::select! {
        biased;
        _ = engine.area(DATASET_ID, &request) => {}
        _ = tokio::time::sleep(std::time::Duration::ZERO) => {}
    }

    assert_released_and_prunable(&registry, v1.version_id());
    assert!(!v1.dir().exists());
}

#[tokio::test]
async fn test_failed_query_releases_version() {
    let (_dir, registry) = temp_registry();
    let v1 = publish_active(&registry, DATASET_ID, &regional_grid(), reference_time());
    let engine = QueryEngine::new(registry.clone(), LimitsConfig::default());

    let err = engine
        .position(
            DATASET_ID,
            &position("-147,12", Some("2030-01-01T00:00:00Z"), None),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::OutOfRange(_)));

    assert_released_and_prunable(&registry, v1.version_id());
    assert!(!v1.dir().exists());
}
