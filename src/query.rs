// Statement construction: table selector + scan hint + rendered condition, with
// parameters in placeholder order. Nothing caller-supplied is spliced into SQL
// text except through `?` placeholders.

use tracing::debug;

use crate::condition::Condition;
use crate::error::{Result, StoreError};
use crate::models::{
    ClusterAggregate, HostAggregate, MetricPoint, SampleValues, instance_to_column,
    normalize_app_id,
};
use crate::schema::MetricTable;

/// Row cap applied when a condition carries no explicit limit.
pub const DEFAULT_RESULTSET_LIMIT: u32 = 5760;
/// Lookback applied to the scan hint's lower bound.
pub const NATIVE_TIME_RANGE_DELTA_MS: i64 = 120_000;

/// A positional bind value.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Text(String),
    Int(i64),
    Real(f64),
    Null,
}

/// Counts are stored as SQLite INTEGER; anything past `i64::MAX` is rejected.
fn count_param(count: u64) -> Result<Param> {
    i64::try_from(count)
        .map(Param::Int)
        .map_err(|_| StoreError::invalid(format!("count {count} out of range")))
}

/// Prepared SQL plus its bind values in `?` order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Param>,
    pub fetch_size: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryConfig {
    pub default_limit: u32,
    pub time_range_delta_ms: i64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_RESULTSET_LIMIT,
            time_range_delta_ms: NATIVE_TIME_RANGE_DELTA_MS,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    config: QueryConfig,
}

impl QueryBuilder {
    pub fn new(config: QueryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Lets the engine skip data older than `start_time - delta`. Results are unaffected.
    pub fn time_range_hint(&self, start_time: i64) -> String {
        format!(
            "/*+ NATIVE_TIME_RANGE({}) */",
            start_time.saturating_sub(self.config.time_range_delta_ms)
        )
    }

    /// Renders the WHERE clause after checking the condition fits `table`.
    fn where_clause(&self, table: MetricTable, condition: &dyn Condition) -> Result<String> {
        let clause = condition.condition_clause()?;
        if table.is_cluster() && condition.hostname().is_some() {
            return Err(StoreError::invalid(format!(
                "hostname filter not supported on {table}"
            )));
        }
        if let Some(order) = condition
            .order_by()
            .iter()
            .find(|o| !o.column.exists_in(table))
        {
            return Err(StoreError::invalid(format!(
                "cannot order {table} by {}",
                order.column.as_sql()
            )));
        }
        Ok(clause)
    }

    /// Range query over [start, end), default order (metric_name, server_time).
    pub fn prepare_get_metrics(
        &self,
        table: MetricTable,
        condition: &dyn Condition,
    ) -> Result<Statement> {
        let clause = self.where_clause(table, condition)?;

        let mut sql = String::from("SELECT ");
        if let Some(start) = condition.start_time() {
            sql.push_str(&self.time_range_hint(start));
            sql.push(' ');
        }
        sql.push_str(&format!(
            "{} FROM {} WHERE {}",
            table.select_list(),
            table.name(),
            clause
        ));
        let order = condition
            .order_by_clause()
            .unwrap_or_else(|| "metric_name, server_time".to_string());
        sql.push_str(&format!(" ORDER BY {order}"));
        if let Some(limit) = condition.limit().resolve(self.config.default_limit) {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let params = condition.params();
        debug!(sql = %sql, params = ?params, grouped = condition.is_grouped(), "prepared range query");
        Ok(Statement {
            sql,
            params,
            fetch_size: condition.fetch_size(),
        })
    }

    /// Point-in-time query: latest rows, one per requested name at most.
    /// The caller's limit is ignored in favour of the name count.
    pub fn prepare_get_latest_metrics(
        &self,
        table: MetricTable,
        condition: &dyn Condition,
    ) -> Result<Statement> {
        if condition.is_empty() {
            return Err(StoreError::invalid("condition is empty"));
        }
        let name_count = match condition.metric_names() {
            Some(names) if !names.is_empty() => names.len(),
            _ => {
                return Err(StoreError::invalid(
                    "point in time query without metric names not supported",
                ));
            }
        };
        let clause = self.where_clause(table, condition)?;

        let order = condition
            .order_by_clause()
            .unwrap_or_else(|| "server_time DESC, metric_name".to_string());
        let sql = format!(
            "SELECT {} FROM {} WHERE {} ORDER BY {} LIMIT {}",
            table.select_list(),
            table.name(),
            clause,
            order,
            name_count
        );

        let params = condition.params();
        debug!(sql = %sql, params = ?params, grouped = condition.is_grouped(), "prepared point in time query");
        Ok(Statement {
            sql,
            params,
            fetch_size: condition.fetch_size(),
        })
    }

    /// Upsert-by-key over every column of `table`.
    fn upsert_sql(table: MetricTable) -> String {
        let columns = table.columns();
        format!(
            "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
            table.name(),
            columns.join(", "),
            vec!["?"; columns.len()].join(", ")
        )
    }

    /// Raw sample upsert. The quadruple is derived from the series when one is given.
    pub fn prepare_upsert_metric_record(&self, point: &MetricPoint) -> Result<Statement> {
        let summary = point.summary().ok_or_else(|| {
            StoreError::invalid(format!("metric {} has no values", point.metric_name))
        })?;
        let metrics = match &point.values {
            SampleValues::Series(values) => Param::Text(serde_json::to_string(values)?),
            SampleValues::Aggregate(_) => Param::Null,
        };
        Ok(Statement {
            sql: Self::upsert_sql(MetricTable::Record),
            params: vec![
                Param::Text(point.metric_name.clone()),
                Param::Text(point.hostname.clone()),
                Param::Text(normalize_app_id(&point.app_id)),
                Param::Text(instance_to_column(point.instance_id.as_deref()).to_string()),
                Param::Int(point.server_time),
                Param::Int(point.start_time),
                Param::Text(point.units.clone()),
                Param::Real(summary.sum),
                count_param(summary.count)?,
                Param::Real(summary.max),
                Param::Real(summary.min),
                metrics,
            ],
            fetch_size: None,
        })
    }

    pub fn prepare_upsert_host_aggregate(
        &self,
        table: MetricTable,
        agg: &HostAggregate,
    ) -> Result<Statement> {
        if !table.is_host_aggregate() {
            return Err(StoreError::invalid(format!(
                "{table} is not a host aggregate table"
            )));
        }
        Ok(Statement {
            sql: Self::upsert_sql(table),
            params: vec![
                Param::Text(agg.key.metric_name.clone()),
                Param::Text(agg.key.hostname.clone()),
                Param::Text(normalize_app_id(&agg.key.app_id)),
                Param::Text(instance_to_column(agg.key.instance_id.as_deref()).to_string()),
                Param::Int(agg.server_time),
                Param::Text(agg.units.clone()),
                Param::Real(agg.aggregate.sum),
                count_param(agg.aggregate.count)?,
                Param::Real(agg.aggregate.max),
                Param::Real(agg.aggregate.min),
            ],
            fetch_size: None,
        })
    }

    /// The count column is hosts_count or metric_count depending on `table`.
    pub fn prepare_upsert_cluster_aggregate(
        &self,
        table: MetricTable,
        agg: &ClusterAggregate,
    ) -> Result<Statement> {
        if !table.is_cluster() {
            return Err(StoreError::invalid(format!(
                "{table} is not a cluster aggregate table"
            )));
        }
        Ok(Statement {
            sql: Self::upsert_sql(table),
            params: vec![
                Param::Text(agg.key.metric_name.clone()),
                Param::Text(normalize_app_id(&agg.key.app_id)),
                Param::Text(instance_to_column(agg.key.instance_id.as_deref()).to_string()),
                Param::Int(agg.server_time),
                Param::Text(agg.units.clone()),
                Param::Real(agg.aggregate.sum),
                count_param(agg.aggregate.count)?,
                Param::Real(agg.aggregate.max),
                Param::Real(agg.aggregate.min),
            ],
            fetch_size: None,
        })
    }
}
