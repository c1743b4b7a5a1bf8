//! EDR API Service Library
//!
//! HTTP surface of the wave forecast service: OGC API - Environmental Data
//! Retrieval queries over the versions held by a [`storage::DatasetRegistry`],
//! plus admin endpoints that drive the ingestion pipeline.

pub mod config;
pub mod content_negotiation;
pub mod engine;
pub mod handlers;
pub mod scheduler;
pub mod state;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Extension, Router,
};

use crate::state::AppState;

/// Build the router with every EDR, admin and health route.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Landing page
        .route("/edr", get(handlers::landing::landing_handler))
        .route("/edr/", get(handlers::landing::landing_handler))
        // Conformance
        .route(
            "/edr/conformance",
            get(handlers::conformance::conformance_handler),
        )
        // Collections
        .route(
            "/edr/collections",
            get(handlers::collections::list_collections_handler),
        )
        .route(
            "/edr/collections/:collection_id",
            get(handlers::collections::get_collection_handler),
        )
        // Instances
        .route(
            "/edr/collections/:collection_id/instances",
            get(handlers::instances::list_instances_handler),
        )
        .route(
            "/edr/collections/:collection_id/instances/:instance_id",
            get(handlers::instances::get_instance_handler),
        )
        // Position query
        .route(
            "/edr/collections/:collection_id/position",
            get(handlers::position::position_handler),
        )
        .route(
            "/edr/collections/:collection_id/instances/:instance_id/position",
            get(handlers::position::instance_position_handler),
        )
        // Area query
        .route(
            "/edr/collections/:collection_id/area",
            get(handlers::area::area_handler),
        )
        .route(
            "/edr/collections/:collection_id/instances/:instance_id/area",
            get(handlers::area::instance_area_handler),
        )
        // Admin
        .route("/admin/datasets", get(handlers::admin::list_datasets_handler))
        .route("/admin/reload", post(handlers::admin::reload_handler))
        .route(
            "/admin/promote/:version_id",
            post(handlers::admin::promote_handler),
        )
        .route("/admin/prune", post(handlers::admin::prune_handler))
        // Health and metrics
        .route("/health", get(handlers::health::health_handler))
        .route("/ready", get(handlers::health::ready_handler))
        .route("/metrics", get(handlers::health::metrics_handler))
        .layer(Extension(state))
}
