// Handlers: version, metric reads (host + cluster), metric writes

use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::AppState;
use crate::condition::{Condition, DefaultCondition};
use crate::error::{Result, StoreError};
use crate::metric_repo::{MetricRepo, MetricRow};
use crate::models::{ClusterAggregate, HostAggregate, MetricPoint};
use crate::schema::MetricTable;
use crate::version::{NAME, VERSION};

/// Row grain to read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    Seconds,
    Minutes,
    Hours,
}

/// Query string of the timeline read endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetricsQuery {
    /// Comma-separated.
    pub metric_names: Option<String>,
    pub hostname: Option<String>,
    pub app_id: Option<String>,
    pub instance_id: Option<String>,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub limit: Option<u32>,
    pub precision: Option<Precision>,
    /// Names are LIKE patterns.
    pub pattern: bool,
}

impl MetricsQuery {
    fn names(&self) -> Vec<String> {
        self.metric_names
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(String::from)
            .collect()
    }

    fn to_condition(&self) -> DefaultCondition {
        let mut condition = if self.pattern {
            DefaultCondition::like()
        } else {
            DefaultCondition::new()
        }
        .with_metric_names(self.names());
        if let Some(h) = &self.hostname {
            condition = condition.with_hostname(h.as_str());
        }
        if let Some(a) = &self.app_id {
            condition = condition.with_app_id(a.as_str());
        }
        if let Some(i) = &self.instance_id {
            condition = condition.with_instance_id(i.as_str());
        }
        if let Some(s) = self.start_time {
            condition = condition.with_start_time(s);
        }
        if let Some(e) = self.end_time {
            condition = condition.with_end_time(e);
        }
        if let Some(l) = self.limit {
            condition = condition.with_limit(l);
        }
        condition
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct InsertRequest {
    metrics: Vec<MetricPoint>,
}

#[derive(Debug, Serialize)]
pub(super) struct MetricsResponse<R> {
    metrics: Vec<R>,
}

/// Range scan split per metric name, or latest-per-metric when no time bound is given.
async fn read<R>(repo: &MetricRepo, table: MetricTable, q: &MetricsQuery) -> Result<Vec<R>>
where
    R: MetricRow,
{
    let condition = q.to_condition();
    if condition.is_point_in_time() {
        if q.pattern {
            return Err(StoreError::invalid(
                "pattern query requires startTime or endTime",
            ));
        }
        return repo.query_latest_per_metric(table, condition).await;
    }
    if q.pattern || condition.metric_names().is_none() {
        repo.query_range(table, &condition).await
    } else {
        repo.query_range_per_metric(table, condition).await
    }
}

fn respond<R: Serialize>(rows: Vec<R>) -> Json<MetricsResponse<R>> {
    Json(MetricsResponse { metrics: rows })
}

/// GET /version: returns service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    Json(json!({
        "name": NAME,
        "version": VERSION,
    }))
}

/// GET /ws/v1/timeline/metrics: per-host rows; precision defaults to raw samples.
pub(super) async fn get_metrics_handler(
    State(state): State<AppState>,
    Query(q): Query<MetricsQuery>,
) -> Result<axum::response::Response> {
    let repo = &state.repo;
    let response = match q.precision.unwrap_or(Precision::Seconds) {
        Precision::Seconds => {
            respond(read::<MetricPoint>(repo, MetricTable::Record, &q).await?).into_response()
        }
        Precision::Minutes => {
            respond(read::<HostAggregate>(repo, MetricTable::HostMinute, &q).await?).into_response()
        }
        Precision::Hours => {
            respond(read::<HostAggregate>(repo, MetricTable::HostHourly, &q).await?).into_response()
        }
    };
    Ok(response)
}

/// GET /ws/v1/timeline/metrics/cluster: cross-host rows; precision defaults to minutes.
pub(super) async fn get_cluster_metrics_handler(
    State(state): State<AppState>,
    Query(q): Query<MetricsQuery>,
) -> Result<Json<MetricsResponse<ClusterAggregate>>> {
    let table = match q.precision.unwrap_or(Precision::Minutes) {
        Precision::Minutes => MetricTable::Cluster,
        Precision::Hours => MetricTable::ClusterHourly,
        Precision::Seconds => {
            return Err(StoreError::invalid(
                "cluster metrics are available at minutes or hours precision",
            ));
        }
    };
    Ok(respond(read(&state.repo, table, &q).await?))
}

/// POST /ws/v1/timeline/metrics: stores samples stamped with the server time.
pub(super) async fn post_metrics_handler(
    State(state): State<AppState>,
    Json(body): Json<InsertRequest>,
) -> Result<impl IntoResponse> {
    let inserted = state.repo.insert_samples(&body.metrics).await?;
    Ok(Json(json!({ "inserted": inserted })))
}
