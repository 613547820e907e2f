// Roll-up fold tests: host, hourly and cluster folds over in-memory rows

mod common;

use metricstore::aggregation::{
    AggregatorKind, aggregate_cluster_aggregates, aggregate_cluster_from_records,
    aggregate_host_aggregates, aggregate_metric_records,
};
use metricstore::models::{
    ClusterAggregate, ClusterMetricKey, HostAggregate, HostMetricKey, MetricAggregate,
};
use metricstore::schema::MetricTable;

use common::{aggregate_point, minute_series};

const BUCKET: i64 = 1_700_000_040_000;

fn host_key(metric: &str, host: &str) -> HostMetricKey {
    HostMetricKey {
        metric_name: metric.into(),
        hostname: host.into(),
        app_id: "host".into(),
        instance_id: None,
    }
}

#[test]
fn empty_input_writes_nothing() {
    assert!(aggregate_metric_records(&[], BUCKET).is_empty());
    assert!(aggregate_host_aggregates(&[], BUCKET).is_empty());
    assert!(aggregate_cluster_from_records(&[], BUCKET).is_empty());
    assert!(aggregate_cluster_aggregates(&[], BUCKET).is_empty());
}

#[test]
fn host_fold_sums_counts_and_widens_extremes() {
    let points: Vec<_> = (0..5)
        .flat_map(|i| {
            let start = BUCKET + i * 60_000;
            [
                minute_series("disk_free", "h1", start),
                minute_series("mem_free", "h1", start),
            ]
        })
        .collect();
    let rows = aggregate_metric_records(&points, BUCKET);
    assert_eq!(rows.len(), 2);
    for row in &rows {
        assert_eq!(row.server_time, BUCKET);
        assert_eq!(row.aggregate.count, 20);
        assert_eq!(row.aggregate.sum, 15.0);
        assert_eq!(row.aggregate.max, 2.0);
        assert_eq!(row.aggregate.min, 0.0);
        assert_eq!(row.avg(), Some(0.75));
        assert_eq!(row.units, "bytes");
    }
    assert_eq!(rows[0].key, host_key("disk_free", "h1"));
    assert_eq!(rows[1].key, host_key("mem_free", "h1"));
}

#[test]
fn host_fold_keeps_hosts_apart() {
    let points = vec![
        aggregate_point("load", "h1", "host", MetricAggregate::new(4.0, 2, 3.0, 1.0)),
        aggregate_point("load", "h2", "host", MetricAggregate::new(10.0, 1, 10.0, 10.0)),
        aggregate_point("load", "h1", "host", MetricAggregate::new(2.0, 2, 1.5, 0.5)),
    ];
    let rows = aggregate_metric_records(&points, BUCKET);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].key.hostname, "h1");
    assert_eq!(rows[0].aggregate, MetricAggregate::new(6.0, 4, 3.0, 0.5));
    assert_eq!(rows[1].key.hostname, "h2");
    assert_eq!(rows[1].aggregate, MetricAggregate::new(10.0, 1, 10.0, 10.0));
}

#[test]
fn hourly_fold_of_minute_rows() {
    let minutes: Vec<HostAggregate> = (0..12)
        .map(|i| HostAggregate {
            key: host_key("disk_free", "h1"),
            server_time: BUCKET + i * 300_000,
            units: "bytes".into(),
            aggregate: MetricAggregate::new(15.0, 20, 2.0, 0.0),
        })
        .collect();
    let rows = aggregate_host_aggregates(&minutes, BUCKET);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].aggregate, MetricAggregate::new(180.0, 240, 2.0, 0.0));
    assert_eq!(rows[0].avg(), Some(0.75));
}

#[test]
fn zero_count_rows_are_ignored() {
    let rows = vec![HostAggregate {
        key: host_key("disk_free", "h1"),
        server_time: BUCKET,
        units: String::new(),
        aggregate: MetricAggregate::new(0.0, 0, 0.0, 0.0),
    }];
    assert!(aggregate_host_aggregates(&rows, BUCKET).is_empty());
}

#[test]
fn cluster_fold_counts_hosts_and_sums_host_averages() {
    let points = vec![
        aggregate_point("load", "h1", "host", MetricAggregate::new(4.0, 2, 3.0, 1.0)),
        aggregate_point("load", "h2", "host", MetricAggregate::new(6.0, 3, 4.0, 0.5)),
        aggregate_point("load", "h3", "host", MetricAggregate::new(5.0, 1, 5.0, 5.0)),
    ];
    let rows = aggregate_cluster_from_records(&points, BUCKET);
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(
        row.key,
        ClusterMetricKey {
            metric_name: "load".into(),
            app_id: "host".into(),
            instance_id: None,
        }
    );
    // host averages 2.0 + 2.0 + 5.0
    assert_eq!(row.aggregate, MetricAggregate::new(9.0, 3, 5.0, 0.5));
    assert_eq!(row.avg(), Some(3.0));
}

#[test]
fn cluster_fold_separates_apps() {
    let points = vec![
        aggregate_point("rpc", "h1", "namenode", MetricAggregate::new(1.0, 1, 1.0, 1.0)),
        aggregate_point("rpc", "h1", "datanode", MetricAggregate::new(2.0, 1, 2.0, 2.0)),
    ];
    let rows = aggregate_cluster_from_records(&points, BUCKET);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].key.app_id, "datanode");
    assert_eq!(rows[1].key.app_id, "namenode");
}

#[test]
fn cluster_hourly_fold() {
    let minutes: Vec<ClusterAggregate> = (0..60)
        .map(|i| ClusterAggregate {
            key: ClusterMetricKey {
                metric_name: "load".into(),
                app_id: "host".into(),
                instance_id: None,
            },
            server_time: BUCKET + i * 60_000,
            units: String::new(),
            aggregate: MetricAggregate::new(3.0, 2, 2.5, 0.5),
        })
        .collect();
    let rows = aggregate_cluster_aggregates(&minutes, BUCKET);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].aggregate, MetricAggregate::new(180.0, 120, 2.5, 0.5));
    assert_eq!(rows[0].avg(), Some(1.5));
}

#[test]
fn folds_are_order_independent_for_integral_values() {
    let mut points = vec![
        aggregate_point("load", "h1", "host", MetricAggregate::new(4.0, 2, 3.0, 1.0)),
        aggregate_point("load", "h1", "host", MetricAggregate::new(2.0, 2, 1.5, 0.5)),
        aggregate_point("load", "h1", "host", MetricAggregate::new(8.0, 1, 8.0, 8.0)),
    ];
    let forward = aggregate_metric_records(&points, BUCKET);
    points.reverse();
    let backward = aggregate_metric_records(&points, BUCKET);
    assert_eq!(forward[0].aggregate, backward[0].aggregate);
}

#[test]
fn aggregator_tables() {
    assert_eq!(AggregatorKind::HostMinute.source_table(), MetricTable::Record);
    assert_eq!(AggregatorKind::HostMinute.target_table(), MetricTable::HostMinute);
    assert_eq!(AggregatorKind::HostHourly.source_table(), MetricTable::HostMinute);
    assert_eq!(AggregatorKind::HostHourly.target_table(), MetricTable::HostHourly);
    assert_eq!(AggregatorKind::ClusterMinute.source_table(), MetricTable::Record);
    assert_eq!(AggregatorKind::ClusterMinute.target_table(), MetricTable::Cluster);
    assert_eq!(AggregatorKind::ClusterHourly.source_table(), MetricTable::Cluster);
    assert_eq!(
        AggregatorKind::ClusterHourly.target_table(),
        MetricTable::ClusterHourly
    );
}

#[test]
fn zero_count_aggregate_samples_are_ignored() {
    let points = vec![
        aggregate_point("load", "h1", "host", MetricAggregate::new(0.0, 0, 0.0, 0.0)),
        aggregate_point("load", "h2", "host", MetricAggregate::new(0.0, 0, 0.0, 0.0)),
    ];
    assert!(aggregate_metric_records(&points, BUCKET).is_empty());
    assert!(aggregate_cluster_from_records(&points, BUCKET).is_empty());
}
