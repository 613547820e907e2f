// Aggregator tests: end-to-end windows over an on-disk store, scheduler ticks

mod common;

use std::sync::Arc;

use metricstore::aggregation::{Aggregator, AggregatorKind};
use metricstore::aggregation_worker::{SchedulerState, completed_window, run_one_tick};
use metricstore::condition::DefaultCondition;
use metricstore::metric_repo::now_ms;
use metricstore::models::{
    ClusterAggregate, HostAggregate, HostMetricKey, MetricAggregate, MetricPoint,
};
use metricstore::query::{QueryBuilder, QueryConfig};
use metricstore::schema::{MS_PER_HOUR, MS_PER_MINUTE, MetricTable};

use common::{aggregate_point, minute_series, test_repo, test_repo_with_builder};

async fn host_rows(
    repo: &metricstore::metric_repo::MetricRepo,
    table: MetricTable,
    start: i64,
    end: i64,
) -> Vec<HostAggregate> {
    let condition = DefaultCondition::new()
        .with_metric_names(["disk_free", "mem_free"])
        .with_time_range(start, end);
    repo.query_range(table, &condition).await.unwrap()
}

#[tokio::test]
async fn minute_window_over_raw_samples() {
    let (repo, _dir) = test_repo().await;
    let repo = Arc::new(repo);
    let start = now_ms();
    for i in 0..5 {
        let t = start + i * 60_000;
        repo.insert_samples(&[
            minute_series("disk_free", "h1", t),
            minute_series("mem_free", "h1", t),
        ])
        .await
        .unwrap();
    }

    let end = start + 240_000;
    let aggregator = Aggregator::new(repo.clone(), AggregatorKind::HostMinute);
    assert!(aggregator.run(start, end).await);

    let rows = host_rows(&repo, MetricTable::HostMinute, start, end).await;
    assert_eq!(rows.len(), 2);
    for row in &rows {
        assert_eq!(row.server_time, start);
        assert_eq!(row.aggregate.max, 2.0);
        assert_eq!(row.aggregate.min, 0.0);
        assert_eq!(row.aggregate.count, 20);
        assert_eq!(row.aggregate.sum, 15.0);
        assert_eq!(row.avg(), Some(0.75));
    }
}

#[tokio::test]
async fn hourly_window_over_minute_rows() {
    let (repo, _dir) = test_repo().await;
    let repo = Arc::new(repo);
    let start = now_ms();
    let minutes: Vec<HostAggregate> = ["disk_free", "mem_free"]
        .iter()
        .flat_map(|metric| {
            (0..12).map(move |i| HostAggregate {
                key: HostMetricKey {
                    metric_name: (*metric).into(),
                    hostname: "h1".into(),
                    app_id: "host".into(),
                    instance_id: None,
                },
                server_time: start + i * 300_000,
                units: "bytes".into(),
                aggregate: MetricAggregate::new(15.0, 20, 2.0, 0.0),
            })
        })
        .collect();
    repo.upsert_host_aggregates(MetricTable::HostMinute, &minutes)
        .await
        .unwrap();

    let end = start + MS_PER_HOUR;
    let aggregator = Aggregator::new(repo.clone(), AggregatorKind::HostHourly);
    assert!(aggregator.run(start, end).await);

    let rows = host_rows(&repo, MetricTable::HostHourly, start, end).await;
    assert_eq!(rows.len(), 2);
    for row in &rows {
        assert_eq!(row.server_time, start);
        assert_eq!(row.aggregate.max, 2.0);
        assert_eq!(row.aggregate.min, 0.0);
        assert_eq!(row.aggregate.count, 240);
        assert_eq!(row.aggregate.sum, 180.0);
        assert_eq!(row.avg(), Some(0.75));
    }
}

#[tokio::test]
async fn rerunning_a_window_is_idempotent() {
    let (repo, _dir) = test_repo().await;
    let repo = Arc::new(repo);
    let start = now_ms();
    for i in 0..3 {
        repo.insert_samples(&[minute_series("disk_free", "h1", start + i * 60_000)])
            .await
            .unwrap();
    }
    let end = start + MS_PER_MINUTE;
    let aggregator = Aggregator::new(repo.clone(), AggregatorKind::HostMinute);

    assert!(aggregator.run(start, end).await);
    let first = host_rows(&repo, MetricTable::HostMinute, start, end).await;
    assert!(aggregator.run(start, end).await);
    let second = host_rows(&repo, MetricTable::HostMinute, start, end).await;
    assert_eq!(first, second);
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].aggregate.count, 12);
}

#[tokio::test]
async fn empty_window_writes_nothing() {
    let (repo, _dir) = test_repo().await;
    let repo = Arc::new(repo);
    let start = now_ms();
    let written = Aggregator::new(repo.clone(), AggregatorKind::HostMinute)
        .try_run(start, start + MS_PER_MINUTE)
        .await
        .unwrap();
    assert_eq!(written, 0);
}

#[tokio::test]
async fn inverted_window_is_rejected() {
    let (repo, _dir) = test_repo().await;
    let repo = Arc::new(repo);
    let start = now_ms();
    let aggregator = Aggregator::new(repo, AggregatorKind::ClusterMinute);
    let err = aggregator.try_run(start, start).await.unwrap_err();
    assert!(err.is_invalid_condition());
    assert!(!aggregator.run(start + 1, start).await);
}

#[tokio::test]
async fn cluster_minute_and_hourly() {
    let (repo, _dir) = test_repo().await;
    let repo = Arc::new(repo);
    let start = now_ms();
    repo.insert_samples(&[
        aggregate_point("load", "h1", "host", MetricAggregate::new(4.0, 2, 3.0, 1.0)),
        aggregate_point("load", "h2", "host", MetricAggregate::new(6.0, 3, 4.0, 0.5)),
    ])
    .await
    .unwrap();

    let minute_end = start + MS_PER_MINUTE;
    assert!(
        Aggregator::new(repo.clone(), AggregatorKind::ClusterMinute)
            .run(start, minute_end)
            .await
    );
    let condition = DefaultCondition::new()
        .with_metric_names(["load"])
        .with_time_range(start, minute_end);
    let minute: Vec<ClusterAggregate> = repo
        .query_range(MetricTable::Cluster, &condition)
        .await
        .unwrap();
    assert_eq!(minute.len(), 1);
    assert_eq!(minute[0].aggregate, MetricAggregate::new(4.0, 2, 4.0, 0.5));
    assert_eq!(minute[0].avg(), Some(2.0));

    let hour_end = start + MS_PER_HOUR;
    assert!(
        Aggregator::new(repo.clone(), AggregatorKind::ClusterHourly)
            .run(start, hour_end)
            .await
    );
    let condition = DefaultCondition::new()
        .with_metric_names(["load"])
        .with_time_range(start, hour_end);
    let hourly: Vec<ClusterAggregate> = repo
        .query_range(MetricTable::ClusterHourly, &condition)
        .await
        .unwrap();
    assert_eq!(hourly.len(), 1);
    assert_eq!(hourly[0].aggregate, MetricAggregate::new(4.0, 2, 4.0, 0.5));
    assert_eq!(hourly[0].server_time, start);
}

#[test]
fn completed_window_is_aligned_and_delayed() {
    let now = 1_700_000_095_000; // 55s into a minute (minute starts at ..._040_000)
    assert_eq!(
        completed_window(now, 0, MS_PER_MINUTE),
        (1_699_999_980_000, 1_700_000_040_000)
    );
    assert_eq!(
        completed_window(now, 60_000, MS_PER_MINUTE),
        (1_699_999_920_000, 1_699_999_980_000)
    );
    let (s, e) = completed_window(now, 30_000, MS_PER_HOUR);
    assert_eq!(e - s, MS_PER_HOUR);
    assert_eq!(e % MS_PER_HOUR, 0);
    assert!(e <= now - 30_000);
}

#[tokio::test]
async fn tick_runs_minute_windows_then_hour() {
    let (repo, _dir) = test_repo().await;
    let repo = Arc::new(repo);
    let hour_start = (now_ms() / MS_PER_HOUR) * MS_PER_HOUR - MS_PER_HOUR;
    let hour_end = hour_start + MS_PER_HOUR;

    let mut state = SchedulerState::default();
    // first tick rebuilds every minute of the previous hour, rolls it up, then
    // the current hour's minutes up to now
    let report = run_one_tick(&repo, &mut state, hour_end - 1, 0).await;
    assert_eq!(report.minute_windows, 119);
    assert_eq!(report.hourly_windows, 1);
    assert_eq!(state.last_minute_end, Some(hour_end - MS_PER_MINUTE));
    assert_eq!(state.last_hour_end, Some(hour_start));

    // crossing the hour boundary completes the last minute, then the hour
    let report = run_one_tick(&repo, &mut state, hour_end + 1, 0).await;
    assert_eq!(report.minute_windows, 1);
    assert_eq!(report.hourly_windows, 1);
    assert_eq!(state.last_minute_end, Some(hour_end));
    assert_eq!(state.last_hour_end, Some(hour_end));

    // same instant again: nothing pending
    let report = run_one_tick(&repo, &mut state, hour_end + 1, 0).await;
    assert_eq!(report.minute_windows, 0);
    assert_eq!(report.hourly_windows, 0);
}

#[tokio::test]
async fn tick_catches_up_missed_minutes() {
    let (repo, _dir) = test_repo().await;
    let repo = Arc::new(repo);
    let base = (now_ms() / MS_PER_MINUTE) * MS_PER_MINUTE - 10 * MS_PER_MINUTE;
    let mut state = SchedulerState {
        last_minute_end: Some(base),
        last_hour_end: Some(i64::MAX),
    };
    let report = run_one_tick(&repo, &mut state, base + 5 * MS_PER_MINUTE, 0).await;
    assert_eq!(report.minute_windows, 5);
    assert_eq!(state.last_minute_end, Some(base + 5 * MS_PER_MINUTE));
}

#[tokio::test]
async fn zero_count_aggregate_sample_writes_no_row() {
    let (repo, _dir) = test_repo().await;
    let repo = Arc::new(repo);
    let start = now_ms();
    let inserted = repo
        .insert_samples_at(
            &[aggregate_point("disk_free", "h1", "host", MetricAggregate::new(0.0, 0, 0.0, 0.0))],
            start,
        )
        .await
        .unwrap();
    assert_eq!(inserted, 0);

    let raw: Vec<MetricPoint> = repo
        .query_range(
            MetricTable::Record,
            &DefaultCondition::new()
                .with_metric_names(["disk_free"])
                .with_time_range(start, start + MS_PER_MINUTE),
        )
        .await
        .unwrap();
    assert!(raw.is_empty());

    for kind in [AggregatorKind::HostMinute, AggregatorKind::ClusterMinute] {
        let written = Aggregator::new(repo.clone(), kind)
            .try_run(start, start + MS_PER_MINUTE)
            .await
            .unwrap();
        assert_eq!(written, 0);
    }
    assert!(host_rows(&repo, MetricTable::HostMinute, start, start + MS_PER_MINUTE)
        .await
        .is_empty());
}

#[tokio::test]
async fn window_read_is_not_capped_by_default_limit() {
    let builder = QueryBuilder::new(QueryConfig {
        default_limit: 2,
        ..QueryConfig::default()
    });
    let (repo, _dir) = test_repo_with_builder(builder).await;
    let repo = Arc::new(repo);
    let start = (now_ms() / MS_PER_MINUTE) * MS_PER_MINUTE;
    for i in 0..6 {
        repo.insert_samples_at(&[minute_series("disk_free", "h1", start)], start + i * 5_000)
            .await
            .unwrap();
    }

    let end = start + MS_PER_MINUTE;
    assert!(
        Aggregator::new(repo.clone(), AggregatorKind::HostMinute)
            .run(start, end)
            .await
    );
    let rows = host_rows(&repo, MetricTable::HostMinute, start, end).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].aggregate.count, 24);
    assert_eq!(rows[0].aggregate.sum, 18.0);
}

#[tokio::test]
async fn first_tick_rebuilds_minutes_missed_before_start() {
    let (repo, _dir) = test_repo().await;
    let repo = Arc::new(repo);
    let current_hour = (now_ms() / MS_PER_HOUR) * MS_PER_HOUR;
    let previous_hour = current_hour - MS_PER_HOUR;
    repo.insert_samples_at(
        &[minute_series("disk_free", "h1", previous_hour)],
        previous_hour + 30 * MS_PER_MINUTE + 5_000,
    )
    .await
    .unwrap();
    repo.insert_samples_at(
        &[minute_series("disk_free", "h1", current_hour)],
        current_hour + 2 * MS_PER_MINUTE + 5_000,
    )
    .await
    .unwrap();

    let mut state = SchedulerState::default();
    let now = current_hour + 10 * MS_PER_MINUTE + 1;
    let report = run_one_tick(&repo, &mut state, now, 0).await;
    assert_eq!(report.minute_windows, 70);
    assert_eq!(report.hourly_windows, 1);
    assert_eq!(state.last_minute_end, Some(current_hour + 10 * MS_PER_MINUTE));
    assert_eq!(state.last_hour_end, Some(current_hour));

    let minutes = host_rows(&repo, MetricTable::HostMinute, current_hour, now).await;
    assert_eq!(minutes.len(), 1);
    assert_eq!(minutes[0].server_time, current_hour + 2 * MS_PER_MINUTE);
    assert_eq!(minutes[0].aggregate.count, 4);

    let hourly = host_rows(&repo, MetricTable::HostHourly, previous_hour, current_hour).await;
    assert_eq!(hourly.len(), 1);
    assert_eq!(hourly[0].server_time, previous_hour);
    assert_eq!(hourly[0].aggregate.count, 4);
    assert_eq!(hourly[0].aggregate.sum, 3.0);
}
