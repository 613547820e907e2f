// Row decoding for each table shape.

use std::collections::BTreeMap;

use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::error::Result;
use crate::models::{
    ClusterAggregate, ClusterMetricKey, HostAggregate, HostMetricKey, MetricAggregate,
    MetricPoint, SampleValues, instance_from_column,
};
use crate::schema::MetricTable;

/// A row type readable from one or more metric tables.
pub trait MetricRow: Sized + Send + Unpin {
    fn accepts(table: MetricTable) -> bool;
    fn from_row(table: MetricTable, row: &SqliteRow) -> Result<Self>;
}

fn aggregate_columns(table: MetricTable, row: &SqliteRow) -> Result<MetricAggregate> {
    let sum: f64 = row.try_get("metric_sum")?;
    let count: i64 = row.try_get(table.count_column())?;
    let max: f64 = row.try_get("metric_max")?;
    let min: f64 = row.try_get("metric_min")?;
    Ok(MetricAggregate::new(sum, count.max(0) as u64, max, min))
}

impl MetricRow for MetricPoint {
    fn accepts(table: MetricTable) -> bool {
        table == MetricTable::Record
    }

    fn from_row(table: MetricTable, row: &SqliteRow) -> Result<Self> {
        let metrics: Option<String> = row.try_get("metrics")?;
        let values = match metrics.filter(|m| !m.is_empty()) {
            Some(json) => SampleValues::Series(serde_json::from_str::<BTreeMap<i64, f64>>(&json)?),
            None => SampleValues::Aggregate(aggregate_columns(table, row)?),
        };
        Ok(MetricPoint {
            metric_name: row.try_get("metric_name")?,
            hostname: row.try_get("hostname")?,
            app_id: row.try_get("app_id")?,
            instance_id: instance_from_column(row.try_get("instance_id")?),
            server_time: row.try_get("server_time")?,
            start_time: row.try_get::<Option<i64>, _>("start_time")?.unwrap_or_default(),
            units: row.try_get("units")?,
            values,
        })
    }
}

impl MetricRow for HostAggregate {
    fn accepts(table: MetricTable) -> bool {
        table.is_host_aggregate()
    }

    fn from_row(table: MetricTable, row: &SqliteRow) -> Result<Self> {
        Ok(HostAggregate {
            key: HostMetricKey {
                metric_name: row.try_get("metric_name")?,
                hostname: row.try_get("hostname")?,
                app_id: row.try_get("app_id")?,
                instance_id: instance_from_column(row.try_get("instance_id")?),
            },
            server_time: row.try_get("server_time")?,
            units: row.try_get("units")?,
            aggregate: aggregate_columns(table, row)?,
        })
    }
}

impl MetricRow for ClusterAggregate {
    fn accepts(table: MetricTable) -> bool {
        table.is_cluster()
    }

    fn from_row(table: MetricTable, row: &SqliteRow) -> Result<Self> {
        Ok(ClusterAggregate {
            key: ClusterMetricKey {
                metric_name: row.try_get("metric_name")?,
                app_id: row.try_get("app_id")?,
                instance_id: instance_from_column(row.try_get("instance_id")?),
            },
            server_time: row.try_get("server_time")?,
            units: row.try_get("units")?,
            aggregate: aggregate_columns(table, row)?,
        })
    }
}
