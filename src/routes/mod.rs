// HTTP routes: timeline read/write API

mod http;

use axum::{
    Router,
    routing::get,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::metric_repo::MetricRepo;

pub use http::{MetricsQuery, Precision};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) repo: Arc<MetricRepo>,
}

pub fn app(repo: Arc<MetricRepo>) -> Router {
    let state = AppState { repo };
    Router::new()
        .route("/version", get(http::version_handler)) // GET /version
        .route(
            "/ws/v1/timeline/metrics",
            get(http::get_metrics_handler).post(http::post_metrics_handler),
        ) // GET, POST /ws/v1/timeline/metrics
        .route(
            "/ws/v1/timeline/metrics/cluster",
            get(http::get_cluster_metrics_handler),
        ) // GET /ws/v1/timeline/metrics/cluster
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
