//! HTTP behaviour of the router, driven through `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use chrono::Duration;
use edr_api::config::ServiceConfig;
use edr_api::state::AppState;
use edr_protocol::media_types;
use serde_json::Value;
use storage::DatasetRegistry;
use tempfile::TempDir;
use test_utils::{
    cell_value, publish_active, reference_time, regional_grid, temp_registry, DATASET_ID,
};
use tower::ServiceExt;

struct TestApp {
    _dir: TempDir,
    registry: Arc<DatasetRegistry>,
    state: Arc<AppState>,
}

impl TestApp {
    fn new(max_cells: usize) -> Self {
        let (dir, registry) = temp_registry();
        let mut config = ServiceConfig::default();
        config.base_url = "http://test/edr".to_string();
        config.ingestion.dataset_id = DATASET_ID.to_string();
        config.ingestion.keep_versions = 2;
        config.limits.max_cells = max_cells;
        let state = Arc::new(AppState::from_parts(Arc::clone(&registry), None, &config));
        Self {
            _dir: dir,
            registry,
            state,
        }
    }

    fn with_regional() -> Self {
        let app = Self::new(250_000);
        publish_active(&app.registry, DATASET_ID, &regional_grid(), reference_time());
        app
    }

    async fn send(&self, method: Method, uri: &str) -> (StatusCode, String, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = edr_api::router(Arc::clone(&self.state))
            .oneshot(request)
            .await
            .unwrap();

        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, content_type, json)
    }

    async fn get(&self, uri: &str) -> (StatusCode, String, Value) {
        self.send(Method::GET, uri).await
    }

    async fn post(&self, uri: &str) -> (StatusCode, String, Value) {
        self.send(Method::POST, uri).await
    }
}

#[tokio::test]
async fn test_landing_and_conformance() {
    let app = TestApp::with_regional();

    let (status, _, json) = app.get("/edr").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["links"][0]["href"], "http://test/edr");

    let (status, _, json) = app.get("/edr/conformance").await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["conformsTo"].as_array().unwrap().len() >= 5);
}

#[tokio::test]
async fn test_collections() {
    let app = TestApp::with_regional();

    let (status, content_type, json) = app.get("/edr/collections").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type, media_types::JSON);
    let collection = &json["collections"][0];
    assert_eq!(collection["id"], DATASET_ID);
    assert_eq!(collection["title"], "Test waves");
    assert_eq!(
        collection["extent"]["spatial"]["bbox"][0],
        serde_json::json!([-150.0, 10.0, -140.0, 20.0])
    );
    assert_eq!(
        collection["extent"]["temporal"]["values"].as_array().unwrap().len(),
        4
    );
    assert_eq!(collection["parameter_names"]["htsgwsfc"]["unit"]["symbol"], "m");

    let (status, _, json) = app.get("/edr/collections/waves").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], DATASET_ID);

    let (status, _, json) = app.get("/edr/collections/tides").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["status"], 404);
}

#[tokio::test]
async fn test_position_query() {
    let app = TestApp::with_regional();

    let (status, content_type, json) = app
        .get("/edr/collections/waves/position?coords=POINT(-147%2012)&datetime=2024-01-15T06:00:00Z&parameter-name=htsgwsfc")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type, media_types::GEO_JSON);
    assert_eq!(json["type"], "FeatureCollection");
    assert_eq!(json["numberReturned"], 1);

    let feature = &json["features"][0];
    assert_eq!(feature["geometry"]["coordinates"], serde_json::json!([-147.0, 12.0]));
    assert_eq!(feature["properties"]["datetime"], "2024-01-15T06:00:00Z");
    assert_eq!(feature["properties"]["resolution"], "exact");
    assert_eq!(
        feature["properties"]["parameters"]["htsgwsfc"]["value"],
        f64::from(cell_value(2, 8, 3))
    );
}

#[tokio::test]
async fn test_position_errors() {
    let app = TestApp::with_regional();

    let cases = [
        ("/edr/collections/waves/position", StatusCode::BAD_REQUEST),
        (
            "/edr/collections/waves/position?coords=-147,12&f=CoverageJSON",
            StatusCode::BAD_REQUEST,
        ),
        (
            "/edr/collections/waves/position?coords=-147,95",
            StatusCode::BAD_REQUEST,
        ),
        (
            "/edr/collections/waves/position?coords=-147,12&datetime=2030-01-01T00:00:00Z",
            StatusCode::BAD_REQUEST,
        ),
        (
            "/edr/collections/waves/position?coords=-147,12&parameter-name=sst",
            StatusCode::BAD_REQUEST,
        ),
        (
            "/edr/collections/tides/position?coords=-147,12",
            StatusCode::NOT_FOUND,
        ),
        (
            "/edr/collections/waves/instances/20990101T000000Z/position?coords=-147,12",
            StatusCode::NOT_FOUND,
        ),
    ];
    for (uri, expected) in cases {
        let (status, content_type, json) = app.get(uri).await;
        assert_eq!(status, expected, "{uri}");
        assert_eq!(content_type, media_types::JSON, "{uri}");
        assert_eq!(json["status"], expected.as_u16(), "{uri}");
    }
}

#[tokio::test]
async fn test_position_outside_extent_is_empty_collection() {
    let app = TestApp::with_regional();

    let (status, _, json) = app
        .get("/edr/collections/waves/position?coords=-30,40")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["numberReturned"], 0);
    assert!(json["features"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_area_query_and_limit() {
    let app = TestApp::new(50);
    publish_active(&app.registry, DATASET_ID, &regional_grid(), reference_time());

    let (status, content_type, json) = app
        .get("/edr/collections/waves/area?coords=-148,12,-146,14&datetime=2024-01-15T00:00:00Z")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type, media_types::GEO_JSON);
    assert_eq!(json["numberReturned"], 9);

    let (status, _, json) = app
        .get("/edr/collections/waves/area?coords=-150,10,-140,20")
        .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(json["status"], 413);
}

#[tokio::test]
async fn test_instances() {
    let app = TestApp::with_regional();
    let v2 = publish_active(
        &app.registry,
        DATASET_ID,
        &regional_grid(),
        reference_time() + Duration::hours(6),
    );

    let (status, _, json) = app.get("/edr/collections/waves/instances").await;
    assert_eq!(status, StatusCode::OK);
    let instances = json["instances"].as_array().unwrap();
    assert_eq!(instances.len(), 2);
    assert_eq!(instances[0]["id"], v2.version_id());
    assert_eq!(instances[0]["active"], true);
    assert_eq!(instances[1]["active"], false);

    let old = instances[1]["id"].as_str().unwrap().to_string();
    let (status, _, json) = app
        .get(&format!("/edr/collections/waves/instances/{}", old))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], old.as_str());

    let (status, _, json) = app
        .get(&format!(
            "/edr/collections/waves/instances/{}/position?coords=-147,12&datetime=2024-01-15T00:00:00Z",
            old
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["numberReturned"], 1);

    let (status, _, _) = app
        .get("/edr/collections/waves/instances/20990101T000000Z")
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_promote_and_prune() {
    let app = TestApp::with_regional();
    let v1 = app.registry.get_active(DATASET_ID).unwrap();
    let v2 = publish_active(
        &app.registry,
        DATASET_ID,
        &regional_grid(),
        reference_time() + Duration::hours(6),
    );

    let (status, _, json) = app.get("/admin/datasets").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["datasets"][0]["active_version"], v2.version_id());
    assert_eq!(json["datasets"][0]["versions"].as_array().unwrap().len(), 2);

    // Roll back to v1
    let (status, _, json) = app
        .post(&format!("/admin/promote/{}", v1.version_id()))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["version_id"], v1.version_id());
    assert_eq!(
        app.registry.get_active(DATASET_ID).unwrap().version_id(),
        v1.version_id()
    );

    let (status, _, _) = app.post("/admin/promote/20990101T000000Z").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // With v1 active, keeping one still keeps both
    let (status, _, json) = app.post("/admin/prune?keep=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["removed"], serde_json::json!([]));

    let (status, _, _) = app
        .post(&format!("/admin/promote/{}", v2.version_id()))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, json) = app.post("/admin/prune?keep=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["removed"], serde_json::json!([v1.version_id()]));
    assert!(!v1.dir().exists());

    let (status, _, _) = app.post("/admin/prune?dataset=tides").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_reload_without_source() {
    let app = TestApp::with_regional();
    let (status, _, json) = app.post("/admin/reload").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["status"], 503);
}

#[tokio::test]
async fn test_health_ready_and_metrics() {
    let app = TestApp::new(250_000);

    let (status, _, json) = app.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");

    let (status, _, json) = app.get("/ready").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["ready"], false);

    publish_active(&app.registry, DATASET_ID, &regional_grid(), reference_time());
    let (status, _, json) = app.get("/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["datasets"], serde_json::json!([DATASET_ID]));

    // No recorder in tests
    let (status, _, _) = app.get("/metrics").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
