// One aggregation run over [window_start, window_end): read source rows, fold,
// upsert keyed at window_start. Re-running a window overwrites the same keys,
// so a failed run is retried by running the whole window again.

use std::fmt;
use std::sync::Arc;

use tracing::{info, instrument, warn};

use super::{
    aggregate_cluster_aggregates, aggregate_cluster_from_records, aggregate_host_aggregates,
    aggregate_metric_records,
};
use crate::condition::DefaultCondition;
use crate::error::{Result, StoreError};
use crate::metric_repo::MetricRepo;
use crate::models::{ClusterAggregate, HostAggregate, MetricPoint};
use crate::schema::MetricTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregatorKind {
    /// raw -> per-host minute
    HostMinute,
    /// per-host minute -> per-host hour
    HostHourly,
    /// raw -> cluster minute
    ClusterMinute,
    /// cluster minute -> cluster hour
    ClusterHourly,
}

impl AggregatorKind {
    pub const ALL: [AggregatorKind; 4] = [
        AggregatorKind::HostMinute,
        AggregatorKind::ClusterMinute,
        AggregatorKind::HostHourly,
        AggregatorKind::ClusterHourly,
    ];

    pub fn name(self) -> &'static str {
        match self {
            AggregatorKind::HostMinute => "host_minute",
            AggregatorKind::HostHourly => "host_hourly",
            AggregatorKind::ClusterMinute => "cluster_minute",
            AggregatorKind::ClusterHourly => "cluster_hourly",
        }
    }

    pub fn source_table(self) -> MetricTable {
        match self {
            AggregatorKind::HostMinute | AggregatorKind::ClusterMinute => MetricTable::Record,
            AggregatorKind::HostHourly => MetricTable::HostMinute,
            AggregatorKind::ClusterHourly => MetricTable::Cluster,
        }
    }

    pub fn target_table(self) -> MetricTable {
        match self {
            AggregatorKind::HostMinute => MetricTable::HostMinute,
            AggregatorKind::HostHourly => MetricTable::HostHourly,
            AggregatorKind::ClusterMinute => MetricTable::Cluster,
            AggregatorKind::ClusterHourly => MetricTable::ClusterHourly,
        }
    }
}

impl fmt::Display for AggregatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub struct Aggregator {
    repo: Arc<MetricRepo>,
    kind: AggregatorKind,
}

impl Aggregator {
    pub fn new(repo: Arc<MetricRepo>, kind: AggregatorKind) -> Self {
        Self { repo, kind }
    }

    pub fn kind(&self) -> AggregatorKind {
        self.kind
    }

    /// Scheduler entry point: true when the window was fully written.
    pub async fn run(&self, window_start: i64, window_end: i64) -> bool {
        match self.try_run(window_start, window_end).await {
            Ok(rows) => {
                info!(
                    aggregator = %self.kind,
                    window_start,
                    window_end,
                    rows_written = rows,
                    "aggregation complete"
                );
                true
            }
            Err(e) => {
                warn!(
                    aggregator = %self.kind,
                    window_start,
                    window_end,
                    error = %e,
                    "aggregation failed; window can be re-run"
                );
                false
            }
        }
    }

    /// Returns the number of aggregate rows written.
    /// Window bounds are epoch milliseconds.
    #[instrument(skip(self), fields(aggregator = %self.kind))]
    pub async fn try_run(&self, window_start: i64, window_end: i64) -> Result<usize> {
        if window_end <= window_start {
            return Err(StoreError::invalid(format!(
                "empty aggregation window [{window_start}, {window_end})"
            )));
        }
        // Exhaustive read: the default row cap must not truncate a window.
        let mut condition = DefaultCondition::new()
            .with_time_range(window_start, window_end)
            .grouped(true);
        condition.set_no_limit();

        let source = self.kind.source_table();
        let target = self.kind.target_table();
        match self.kind {
            AggregatorKind::HostMinute => {
                let points: Vec<MetricPoint> = self.repo.query_range(source, &condition).await?;
                let rows = aggregate_metric_records(&points, window_start);
                self.repo.upsert_host_aggregates(target, &rows).await
            }
            AggregatorKind::HostHourly => {
                let minutes: Vec<HostAggregate> = self.repo.query_range(source, &condition).await?;
                let rows = aggregate_host_aggregates(&minutes, window_start);
                self.repo.upsert_host_aggregates(target, &rows).await
            }
            AggregatorKind::ClusterMinute => {
                let points: Vec<MetricPoint> = self.repo.query_range(source, &condition).await?;
                let rows = aggregate_cluster_from_records(&points, window_start);
                self.repo.upsert_cluster_aggregates(target, &rows).await
            }
            AggregatorKind::ClusterHourly => {
                let minutes: Vec<ClusterAggregate> =
                    self.repo.query_range(source, &condition).await?;
                let rows = aggregate_cluster_aggregates(&minutes, window_start);
                self.repo.upsert_cluster_aggregates(target, &rows).await
            }
        }
    }
}
