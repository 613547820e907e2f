// SQLite metric store. Uses sqlx for async + connection pooling.
// All statements come from QueryBuilder; this layer only binds, executes and decodes.

mod rows;

pub use rows::MetricRow;

use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};

use futures_util::TryStreamExt;
use sqlx::sqlite::{
    Sqlite, SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions,
};
use tracing::{debug, instrument, warn};

use crate::condition::{Condition, SplitByMetricNamesCondition};
use crate::config::SchemaConfig;
use crate::error::{Result, StoreError};
use crate::models::{ClusterAggregate, HostAggregate, MetricPoint};
use crate::query::{Param, QueryBuilder, Statement};
use crate::schema::{self, MetricTable};

const SCHEMA_VERSION: i64 = 1;
/// Upper bound on pre-allocation from a caller-supplied fetch size.
const FETCH_CAPACITY_CAP: u32 = 10_000;

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// Binds `params` positionally, in order.
fn bind_params<'q>(mut query: SqliteQuery<'q>, params: &'q [Param]) -> SqliteQuery<'q> {
    for param in params {
        query = match param {
            Param::Text(s) => query.bind(s.as_str()),
            Param::Int(v) => query.bind(*v),
            Param::Real(v) => query.bind(*v),
            Param::Null => query.bind(None::<String>),
        };
    }
    query
}

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub struct MetricRepo {
    pool: SqlitePool,
    builder: QueryBuilder,
    schema: SchemaConfig,
    last_server_time: AtomicI64,
}

impl MetricRepo {
    pub async fn connect(
        path: &str,
        max_pool_size: u32,
        builder: QueryBuilder,
        schema: SchemaConfig,
    ) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_pool_size)
            .connect_with(opts)
            .await?;
        Ok(Self {
            pool,
            builder,
            schema,
            last_server_time: AtomicI64::new(0),
        })
    }

    pub fn builder(&self) -> &QueryBuilder {
        &self.builder
    }

    /// Create the five metric tables if they don't exist.
    pub async fn init(&self) -> anyhow::Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_version (key TEXT PRIMARY KEY, value INTEGER NOT NULL)",
        )
        .execute(&self.pool)
        .await?;

        for table in MetricTable::ALL {
            let ddl = schema::create_table_sql(table, &self.schema.table_options(table));
            debug!(table = %table, sql = %ddl, "create table");
            sqlx::query(&ddl).execute(&self.pool).await?;
            sqlx::query(&schema::create_time_index_sql(table))
                .execute(&self.pool)
                .await?;
        }

        sqlx::query("INSERT OR IGNORE INTO schema_version (key, value) VALUES ('metrics', $1)")
            .bind(SCHEMA_VERSION)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Strictly increasing wall-clock millis, so back-to-back batches never share a key.
    fn next_server_time(&self) -> i64 {
        let now = now_ms();
        let prev = match self.last_server_time.fetch_update(
            Ordering::SeqCst,
            Ordering::SeqCst,
            |last| Some(now.max(last + 1)),
        ) {
            Ok(prev) | Err(prev) => prev,
        };
        now.max(prev + 1)
    }

    /// Stores samples stamped with the current server time.
    pub async fn insert_samples(&self, points: &[MetricPoint]) -> Result<usize> {
        let server_time = self.next_server_time();
        self.insert_samples_at(points, server_time).await
    }

    /// Stores samples at an explicit server time. Points without values are skipped.
    #[instrument(skip(self, points), fields(repo = "metrics", operation = "insert_samples", points_count = points.len()))]
    pub async fn insert_samples_at(&self, points: &[MetricPoint], server_time: i64) -> Result<usize> {
        let mut stmts = Vec::with_capacity(points.len());
        for point in points {
            if point.summary().is_none() {
                warn!(metric = %point.metric_name, host = %point.hostname, "skipping sample without values");
                continue;
            }
            let stamped = MetricPoint {
                server_time,
                ..point.clone()
            };
            stmts.push(self.builder.prepare_upsert_metric_record(&stamped)?);
        }
        self.execute_batch(&stmts).await
    }

    #[instrument(skip(self, table, rows), fields(repo = "metrics", operation = "upsert_host_aggregates", table = %table, rows_count = rows.len()))]
    pub async fn upsert_host_aggregates(
        &self,
        table: MetricTable,
        rows: &[HostAggregate],
    ) -> Result<usize> {
        let stmts = rows
            .iter()
            .map(|r| self.builder.prepare_upsert_host_aggregate(table, r))
            .collect::<Result<Vec<_>>>()?;
        self.execute_batch(&stmts).await
    }

    #[instrument(skip(self, table, rows), fields(repo = "metrics", operation = "upsert_cluster_aggregates", table = %table, rows_count = rows.len()))]
    pub async fn upsert_cluster_aggregates(
        &self,
        table: MetricTable,
        rows: &[ClusterAggregate],
    ) -> Result<usize> {
        let stmts = rows
            .iter()
            .map(|r| self.builder.prepare_upsert_cluster_aggregate(table, r))
            .collect::<Result<Vec<_>>>()?;
        self.execute_batch(&stmts).await
    }

    /// Runs every statement in one transaction.
    async fn execute_batch(&self, stmts: &[Statement]) -> Result<usize> {
        if stmts.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        for stmt in stmts {
            bind_params(sqlx::query(&stmt.sql), &stmt.params)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(stmts.len())
    }

    async fn fetch_rows<R: MetricRow>(&self, table: MetricTable, stmt: &Statement) -> Result<Vec<R>> {
        let mut out = Vec::with_capacity(stmt.fetch_size.unwrap_or(0).min(FETCH_CAPACITY_CAP) as usize);
        let mut rows = bind_params(sqlx::query(&stmt.sql), &stmt.params).fetch(&self.pool);
        while let Some(row) = rows.try_next().await? {
            out.push(R::from_row(table, &row)?);
        }
        Ok(out)
    }

    fn check_row_type<R: MetricRow>(table: MetricTable) -> Result<()> {
        if R::accepts(table) {
            Ok(())
        } else {
            Err(StoreError::invalid(format!(
                "row type {} cannot be read from {table}",
                std::any::type_name::<R>()
            )))
        }
    }

    /// Rows in [start, end) matching `condition`.
    #[instrument(skip(self, table, condition), fields(repo = "metrics", operation = "query_range", table = %table))]
    pub async fn query_range<R: MetricRow>(
        &self,
        table: MetricTable,
        condition: &dyn Condition,
    ) -> Result<Vec<R>> {
        Self::check_row_type::<R>(table)?;
        let stmt = self.builder.prepare_get_metrics(table, condition)?;
        self.fetch_rows(table, &stmt).await
    }

    /// Latest rows for the condition's names, newest first.
    #[instrument(skip(self, table, condition), fields(repo = "metrics", operation = "query_latest", table = %table))]
    pub async fn query_latest<R: MetricRow>(
        &self,
        table: MetricTable,
        condition: &dyn Condition,
    ) -> Result<Vec<R>> {
        Self::check_row_type::<R>(table)?;
        let stmt = self.builder.prepare_get_latest_metrics(table, condition)?;
        self.fetch_rows(table, &stmt).await
    }

    /// One range scan per metric name, concatenated in name order.
    pub async fn query_range_per_metric<R, C>(&self, table: MetricTable, condition: C) -> Result<Vec<R>>
    where
        R: MetricRow,
        C: Condition,
    {
        self.query_split(table, condition, false).await
    }

    /// One point-in-time scan per metric name: the latest row of each.
    pub async fn query_latest_per_metric<R, C>(&self, table: MetricTable, condition: C) -> Result<Vec<R>>
    where
        R: MetricRow,
        C: Condition,
    {
        self.query_split(table, condition, true).await
    }

    async fn query_split<R, C>(&self, table: MetricTable, condition: C, latest: bool) -> Result<Vec<R>>
    where
        R: MetricRow,
        C: Condition,
    {
        let mut split = SplitByMetricNamesCondition::new(condition);
        let names = split
            .original_metric_names()
            .map(<[String]>::to_vec)
            .ok_or_else(|| StoreError::invalid("per-metric query without metric names"))?;
        let mut out = Vec::new();
        for name in names {
            split.set_current_metric(name);
            let rows = if latest {
                self.query_latest(table, &split).await?
            } else {
                self.query_range(table, &split).await?
            };
            out.extend(rows);
        }
        Ok(out)
    }

    /// Deletes rows older than the table's TTL. Returns rows removed.
    #[instrument(skip(self, table), fields(repo = "metrics", operation = "prune_expired", table = %table))]
    pub async fn prune_expired(&self, table: MetricTable, now_ms: i64) -> Result<u64> {
        let cutoff = now_ms - self.schema.table_options(table).ttl_ms();
        let r = sqlx::query(&format!("DELETE FROM {} WHERE server_time < $1", table.name()))
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(r.rows_affected())
    }

    pub async fn prune_all_expired(&self) -> Result<u64> {
        let now = now_ms();
        let mut total = 0;
        for table in MetricTable::ALL {
            total += self.prune_expired(table, now).await?;
        }
        Ok(total)
    }

    /// Reclaim space after deletes (run periodically after pruning).
    #[instrument(skip(self), fields(repo = "metrics", operation = "vacuum"))]
    pub async fn vacuum(&self) -> Result<()> {
        sqlx::query("VACUUM").execute(&self.pool).await?;
        Ok(())
    }
}
