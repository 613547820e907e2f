// Query conditions: filters rendered into a WHERE clause plus positional parameters.
//
// Every variant answers the same accessor set; clause and parameter rendering are
// provided methods built from those accessors, so the placeholder order and the
// binding order cannot drift apart: names -> hostname -> app_id -> instance_id ->
// start_time -> end_time.

mod default;
mod split;

pub use default::{DefaultCondition, NameMatch};
pub use split::SplitByMetricNamesCondition;

use std::fmt;

use crate::error::{Result, StoreError};
use crate::query::Param;
use crate::schema::MetricTable;

/// Values below this are taken as epoch seconds and scaled to milliseconds.
pub const SECONDS_THRESHOLD: i64 = 9_999_999_999;

/// Seconds-vs-milliseconds heuristic: `t < 9_999_999_999` is seconds.
pub fn normalize_time(t: i64) -> i64 {
    if t < SECONDS_THRESHOLD {
        t.saturating_mul(1000)
    } else {
        t
    }
}

/// Row cap policy; `Default` is resolved by the query builder's configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Limit {
    #[default]
    Default,
    Rows(u32),
    Unlimited,
}

impl Limit {
    pub fn resolve(self, default_limit: u32) -> Option<u32> {
        match self {
            Limit::Default => Some(default_limit),
            Limit::Rows(n) => Some(n),
            Limit::Unlimited => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    MetricName,
    Hostname,
    AppId,
    InstanceId,
    ServerTime,
    StartTime,
}

impl Column {
    pub fn as_sql(self) -> &'static str {
        match self {
            Column::MetricName => "metric_name",
            Column::Hostname => "hostname",
            Column::AppId => "app_id",
            Column::InstanceId => "instance_id",
            Column::ServerTime => "server_time",
            Column::StartTime => "start_time",
        }
    }

    pub fn exists_in(self, table: MetricTable) -> bool {
        table.columns().contains(&self.as_sql())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBy {
    pub column: Column,
    pub descending: bool,
}

impl OrderBy {
    pub fn asc(column: Column) -> Self {
        Self {
            column,
            descending: false,
        }
    }

    pub fn desc(column: Column) -> Self {
        Self {
            column,
            descending: true,
        }
    }
}

impl fmt::Display for OrderBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.descending {
            write!(f, "{} DESC", self.column.as_sql())
        } else {
            f.write_str(self.column.as_sql())
        }
    }
}

/// `metric_name IN (?, ?, ...)`
pub(crate) fn exact_names_clause(names: &[String]) -> String {
    let placeholders = vec!["?"; names.len()].join(", ");
    format!("metric_name IN ({placeholders})")
}

/// `(metric_name LIKE ? OR metric_name LIKE ? ...)`
pub(crate) fn like_names_clause(names: &[String]) -> String {
    let likes = vec!["metric_name LIKE ?"; names.len()].join(" OR ");
    format!("({likes})")
}

pub trait Condition: fmt::Debug + Send + Sync {
    /// `None` when no names are set.
    fn metric_names(&self) -> Option<&[String]>;
    fn hostname(&self) -> Option<&str>;
    /// Already case-normalized.
    fn app_id(&self) -> Option<&str>;
    fn instance_id(&self) -> Option<&str>;
    /// Milliseconds, normalized once at construction.
    fn start_time(&self) -> Option<i64>;
    fn end_time(&self) -> Option<i64>;
    fn limit(&self) -> Limit;
    fn fetch_size(&self) -> Option<u32>;
    fn order_by(&self) -> &[OrderBy];
    fn is_grouped(&self) -> bool;

    /// Predicate over metric_name for the current name set.
    fn metric_names_clause(&self) -> Option<String>;

    fn is_empty(&self) -> bool {
        self.metric_names().is_none()
            && self.hostname().is_none()
            && self.app_id().is_none()
            && self.instance_id().is_none()
            && self.start_time().is_none()
            && self.end_time().is_none()
    }

    /// Latest-value query rather than a ranged scan.
    fn is_point_in_time(&self) -> bool {
        self.start_time().is_none() && self.end_time().is_none()
    }

    fn condition_clause(&self) -> Result<String> {
        if self.is_empty() {
            return Err(StoreError::invalid("condition is empty"));
        }
        let mut parts: Vec<String> = Vec::with_capacity(6);
        if let Some(names) = self.metric_names_clause() {
            parts.push(names);
        }
        if self.hostname().is_some() {
            parts.push("hostname = ?".into());
        }
        if self.app_id().is_some() {
            parts.push("app_id = ?".into());
        }
        if self.instance_id().is_some() {
            parts.push("instance_id = ?".into());
        }
        if self.start_time().is_some() {
            parts.push("server_time >= ?".into());
        }
        if self.end_time().is_some() {
            parts.push("server_time < ?".into());
        }
        if parts.is_empty() {
            return Err(StoreError::invalid("condition has no predicate"));
        }
        Ok(parts.join(" AND "))
    }

    /// Parameters in placeholder order.
    fn params(&self) -> Vec<Param> {
        let mut params = Vec::new();
        if let Some(names) = self.metric_names() {
            params.extend(names.iter().map(|n| Param::Text(n.clone())));
        }
        if let Some(h) = self.hostname() {
            params.push(Param::Text(h.to_string()));
        }
        if let Some(a) = self.app_id() {
            params.push(Param::Text(a.to_string()));
        }
        if let Some(i) = self.instance_id() {
            params.push(Param::Text(i.to_string()));
        }
        if let Some(s) = self.start_time() {
            params.push(Param::Int(s));
        }
        if let Some(e) = self.end_time() {
            params.push(Param::Int(e));
        }
        params
    }

    /// `None` when the caller supplied no ordering.
    fn order_by_clause(&self) -> Option<String> {
        let order = self.order_by();
        if order.is_empty() {
            return None;
        }
        let cols: Vec<String> = order.iter().map(ToString::to_string).collect();
        Some(cols.join(", "))
    }
}
