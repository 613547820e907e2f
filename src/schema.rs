// The five metric tables: names, column shapes, composite keys, DDL.
//
// Tables are WITHOUT ROWID so rows are clustered by their composite key and
// range scans by (metric_name, ...) prefix stay narrow. Block encoding and
// compression have no SQLite equivalent; they are recorded in a leading DDL
// comment. TTL is enforced by pruning (see MetricRepo::prune_expired).

use std::fmt;

pub const DEFAULT_ENCODING: &str = "FAST_DIFF";
pub const DEFAULT_COMPRESSION: &str = "SNAPPY";

pub const MS_PER_MINUTE: i64 = 60_000;
pub const MS_PER_HOUR: i64 = 3_600_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricTable {
    /// Raw samples, one row per insert.
    Record,
    HostMinute,
    HostHourly,
    /// Cross-host, 1 minute; count column is the hosts count.
    Cluster,
    ClusterHourly,
}

impl MetricTable {
    pub const ALL: [MetricTable; 5] = [
        MetricTable::Record,
        MetricTable::HostMinute,
        MetricTable::HostHourly,
        MetricTable::Cluster,
        MetricTable::ClusterHourly,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MetricTable::Record => "metric_record",
            MetricTable::HostMinute => "metric_record_minute",
            MetricTable::HostHourly => "metric_record_hourly",
            MetricTable::Cluster => "metric_aggregate",
            MetricTable::ClusterHourly => "metric_aggregate_hourly",
        }
    }

    /// Cluster tables have no hostname column.
    pub fn is_cluster(self) -> bool {
        matches!(self, MetricTable::Cluster | MetricTable::ClusterHourly)
    }

    pub fn is_host_aggregate(self) -> bool {
        matches!(self, MetricTable::HostMinute | MetricTable::HostHourly)
    }

    /// Bucket width for aggregate tables; `None` for raw samples.
    pub fn grain_ms(self) -> Option<i64> {
        match self {
            MetricTable::Record => None,
            MetricTable::HostMinute | MetricTable::Cluster => Some(MS_PER_MINUTE),
            MetricTable::HostHourly | MetricTable::ClusterHourly => Some(MS_PER_HOUR),
        }
    }

    pub fn count_column(self) -> &'static str {
        match self {
            MetricTable::Cluster => "hosts_count",
            _ => "metric_count",
        }
    }

    pub fn key_columns(self) -> &'static [&'static str] {
        match self {
            MetricTable::Record => &[
                "metric_name",
                "hostname",
                "server_time",
                "app_id",
                "instance_id",
            ],
            MetricTable::HostMinute | MetricTable::HostHourly => &[
                "metric_name",
                "hostname",
                "app_id",
                "instance_id",
                "server_time",
            ],
            MetricTable::Cluster | MetricTable::ClusterHourly => {
                &["metric_name", "app_id", "instance_id", "server_time"]
            }
        }
    }

    /// Column list used by SELECT and INSERT, in row-parsing order.
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            MetricTable::Record => &[
                "metric_name",
                "hostname",
                "app_id",
                "instance_id",
                "server_time",
                "start_time",
                "units",
                "metric_sum",
                "metric_count",
                "metric_max",
                "metric_min",
                "metrics",
            ],
            MetricTable::HostMinute | MetricTable::HostHourly => &[
                "metric_name",
                "hostname",
                "app_id",
                "instance_id",
                "server_time",
                "units",
                "metric_sum",
                "metric_count",
                "metric_max",
                "metric_min",
            ],
            MetricTable::Cluster => &[
                "metric_name",
                "app_id",
                "instance_id",
                "server_time",
                "units",
                "metric_sum",
                "hosts_count",
                "metric_max",
                "metric_min",
            ],
            MetricTable::ClusterHourly => &[
                "metric_name",
                "app_id",
                "instance_id",
                "server_time",
                "units",
                "metric_sum",
                "metric_count",
                "metric_max",
                "metric_min",
            ],
        }
    }

    pub fn select_list(self) -> String {
        self.columns().join(", ")
    }
}

impl fmt::Display for MetricTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Deployment-time table parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableOptions {
    pub encoding: String,
    pub compression: String,
    pub ttl_secs: u64,
}

impl TableOptions {
    pub fn ttl_ms(&self) -> i64 {
        (self.ttl_secs as i64).saturating_mul(1000)
    }
}

/// CREATE TABLE for `table`. Option values are validated identifiers (see config).
pub fn create_table_sql(table: MetricTable, opts: &TableOptions) -> String {
    let value_columns = match table {
        MetricTable::Record => {
            "    start_time INTEGER,
    units TEXT NOT NULL DEFAULT '',
    metric_sum REAL NOT NULL,
    metric_count INTEGER NOT NULL,
    metric_max REAL NOT NULL,
    metric_min REAL NOT NULL,
    metrics TEXT,"
        }
        MetricTable::Cluster => {
            "    units TEXT NOT NULL DEFAULT '',
    metric_sum REAL NOT NULL,
    hosts_count INTEGER NOT NULL,
    metric_max REAL NOT NULL,
    metric_min REAL NOT NULL,"
        }
        _ => {
            "    units TEXT NOT NULL DEFAULT '',
    metric_sum REAL NOT NULL,
    metric_count INTEGER NOT NULL,
    metric_max REAL NOT NULL,
    metric_min REAL NOT NULL,"
        }
    };
    let hostname_column = if table.is_cluster() {
        ""
    } else {
        "    hostname TEXT NOT NULL,\n"
    };
    format!(
        "/* DATA_BLOCK_ENCODING='{encoding}', TTL={ttl}, COMPRESSION='{compression}' */
CREATE TABLE IF NOT EXISTS {name} (
    metric_name TEXT NOT NULL,
{hostname_column}    app_id TEXT NOT NULL,
    instance_id TEXT NOT NULL DEFAULT '',
    server_time INTEGER NOT NULL,
{value_columns}
    PRIMARY KEY ({key})
) WITHOUT ROWID",
        encoding = opts.encoding,
        ttl = opts.ttl_secs,
        compression = opts.compression,
        name = table.name(),
        key = table.key_columns().join(", "),
    )
}

/// Secondary index on server_time for TTL pruning.
pub fn create_time_index_sql(table: MetricTable) -> String {
    format!(
        "CREATE INDEX IF NOT EXISTS idx_{name}_server_time ON {name}(server_time)",
        name = table.name()
    )
}
