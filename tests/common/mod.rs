// Shared test helpers
#![allow(dead_code)]

use std::collections::BTreeMap;

use metricstore::config::SchemaConfig;
use metricstore::metric_repo::MetricRepo;
use metricstore::models::{MetricAggregate, MetricPoint, SampleValues};
use metricstore::query::QueryBuilder;
use tempfile::TempDir;

/// On-disk repo in a temp dir; keep the TempDir alive for the test's duration.
pub async fn test_repo() -> (MetricRepo, TempDir) {
    test_repo_with_schema(SchemaConfig::default()).await
}

pub async fn test_repo_with_schema(schema: SchemaConfig) -> (MetricRepo, TempDir) {
    open_test_repo(QueryBuilder::default(), schema).await
}

pub async fn test_repo_with_builder(builder: QueryBuilder) -> (MetricRepo, TempDir) {
    open_test_repo(builder, SchemaConfig::default()).await
}

async fn open_test_repo(builder: QueryBuilder, schema: SchemaConfig) -> (MetricRepo, TempDir) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("metrics.db");
    let repo = MetricRepo::connect(path.to_str().unwrap(), 2, builder, schema)
        .await
        .unwrap();
    repo.init().await.unwrap();
    (repo, dir)
}

pub fn series_point(
    metric_name: &str,
    hostname: &str,
    start_time: i64,
    values: &[(i64, f64)],
) -> MetricPoint {
    MetricPoint {
        metric_name: metric_name.into(),
        hostname: hostname.into(),
        app_id: "host".into(),
        instance_id: None,
        server_time: 0,
        start_time,
        units: "bytes".into(),
        values: SampleValues::Series(values.iter().copied().collect::<BTreeMap<_, _>>()),
    }
}

pub fn aggregate_point(
    metric_name: &str,
    hostname: &str,
    app_id: &str,
    agg: MetricAggregate,
) -> MetricPoint {
    MetricPoint {
        metric_name: metric_name.into(),
        hostname: hostname.into(),
        app_id: app_id.into(),
        instance_id: None,
        server_time: 0,
        start_time: 0,
        units: String::new(),
        values: SampleValues::Aggregate(agg),
    }
}

/// Series {start+15s: 0, +30s: 0, +45s: 1, +60s: 2}: sum 3, count 4, max 2, min 0.
pub fn minute_series(metric_name: &str, hostname: &str, start_time: i64) -> MetricPoint {
    series_point(
        metric_name,
        hostname,
        start_time,
        &[
            (start_time + 15_000, 0.0),
            (start_time + 30_000, 0.0),
            (start_time + 45_000, 1.0),
            (start_time + 60_000, 2.0),
        ],
    )
}
