use serde::Deserialize;

use crate::query::{DEFAULT_RESULTSET_LIMIT, NATIVE_TIME_RANGE_DELTA_MS, QueryConfig};
use crate::schema::{DEFAULT_COMPRESSION, DEFAULT_ENCODING, MetricTable, TableOptions};

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub schema: SchemaConfig,
    #[serde(default)]
    pub query: QuerySettings,
    #[serde(default)]
    pub aggregation: AggregationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_pool_size: u32,
}

/// Deployment-time table options. TTLs are seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    pub encoding: String,
    pub compression: String,
    pub precision_ttl_secs: u64,
    pub host_minute_ttl_secs: u64,
    pub host_hourly_ttl_secs: u64,
    pub cluster_minute_ttl_secs: u64,
    pub cluster_hourly_ttl_secs: u64,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            encoding: DEFAULT_ENCODING.into(),
            compression: DEFAULT_COMPRESSION.into(),
            precision_ttl_secs: 86_400,
            host_minute_ttl_secs: 7 * 86_400,
            host_hourly_ttl_secs: 30 * 86_400,
            cluster_minute_ttl_secs: 30 * 86_400,
            cluster_hourly_ttl_secs: 365 * 86_400,
        }
    }
}

impl SchemaConfig {
    pub fn table_options(&self, table: MetricTable) -> TableOptions {
        let ttl_secs = match table {
            MetricTable::Record => self.precision_ttl_secs,
            MetricTable::HostMinute => self.host_minute_ttl_secs,
            MetricTable::HostHourly => self.host_hourly_ttl_secs,
            MetricTable::Cluster => self.cluster_minute_ttl_secs,
            MetricTable::ClusterHourly => self.cluster_hourly_ttl_secs,
        };
        TableOptions {
            encoding: self.encoding.clone(),
            compression: self.compression.clone(),
            ttl_secs,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QuerySettings {
    pub default_limit: u32,
    pub time_range_delta_ms: i64,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_RESULTSET_LIMIT,
            time_range_delta_ms: NATIVE_TIME_RANGE_DELTA_MS,
        }
    }
}

impl QuerySettings {
    pub fn query_config(&self) -> QueryConfig {
        QueryConfig {
            default_limit: self.default_limit,
            time_range_delta_ms: self.time_range_delta_ms,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    pub enabled: bool,
    /// How often the worker checks for completed windows.
    pub interval_secs: u64,
    /// Lag after a window closes before it is aggregated (late samples).
    pub delay_secs: u64,
    /// How often expired rows are pruned per table TTL.
    pub prune_interval_secs: u64,
    /// Optional cron expression for VACUUM (e.g. "0 0 3 * * *"). Uses local time.
    pub vacuum_schedule: Option<String>,
    /// Run VACUUM every N seconds when vacuum_schedule is not set.
    pub vacuum_interval_secs: u64,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 60,
            delay_secs: 30,
            prune_interval_secs: 3600,
            vacuum_schedule: None,
            vacuum_interval_secs: 86_400,
        }
    }
}

/// Option values are spliced into DDL comments, so only plain identifiers pass.
fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            !self.database.path.is_empty(),
            "database.path must be non-empty"
        );
        anyhow::ensure!(
            self.database.max_pool_size > 0,
            "database.max_pool_size must be > 0, got {}",
            self.database.max_pool_size
        );
        anyhow::ensure!(
            is_identifier(&self.schema.encoding),
            "schema.encoding must be an identifier, got {:?}",
            self.schema.encoding
        );
        anyhow::ensure!(
            is_identifier(&self.schema.compression),
            "schema.compression must be an identifier, got {:?}",
            self.schema.compression
        );
        for table in MetricTable::ALL {
            let opts = self.schema.table_options(table);
            anyhow::ensure!(
                opts.ttl_secs > 0,
                "schema ttl for {} must be > 0",
                table
            );
        }
        anyhow::ensure!(
            self.query.default_limit > 0,
            "query.default_limit must be > 0, got {}",
            self.query.default_limit
        );
        anyhow::ensure!(
            self.query.time_range_delta_ms >= 0,
            "query.time_range_delta_ms must be >= 0, got {}",
            self.query.time_range_delta_ms
        );
        anyhow::ensure!(
            self.aggregation.interval_secs > 0,
            "aggregation.interval_secs must be > 0, got {}",
            self.aggregation.interval_secs
        );
        anyhow::ensure!(
            self.aggregation.prune_interval_secs > 0,
            "aggregation.prune_interval_secs must be > 0, got {}",
            self.aggregation.prune_interval_secs
        );
        anyhow::ensure!(
            self.aggregation.vacuum_interval_secs > 0,
            "aggregation.vacuum_interval_secs must be > 0, got {}",
            self.aggregation.vacuum_interval_secs
        );
        Ok(())
    }
}
