// Exact-match and pattern conditions (same fields, different name predicate).

use super::{Condition, Limit, OrderBy, exact_names_clause, like_names_clause, normalize_time};
use crate::models::normalize_app_id;

/// How metric names are matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NameMatch {
    /// `metric_name IN (...)`
    #[default]
    Exact,
    /// OR-chained `metric_name LIKE ?` for wildcard names.
    Like,
}

/// Request-scoped condition. Empty strings are treated as absent, app ids are
/// case-normalized and times are normalized to milliseconds on the way in.
#[derive(Debug, Clone, Default)]
pub struct DefaultCondition {
    name_match: NameMatch,
    metric_names: Vec<String>,
    hostname: Option<String>,
    app_id: Option<String>,
    instance_id: Option<String>,
    start_time: Option<i64>,
    end_time: Option<i64>,
    limit: Limit,
    fetch_size: Option<u32>,
    order_by: Vec<OrderBy>,
    grouped: bool,
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

impl DefaultCondition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pattern condition: names are LIKE patterns.
    pub fn like() -> Self {
        Self {
            name_match: NameMatch::Like,
            ..Self::default()
        }
    }

    pub fn name_match(&self) -> NameMatch {
        self.name_match
    }

    pub fn with_metric_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metric_names = names
            .into_iter()
            .map(Into::into)
            .filter(|n| !n.is_empty())
            .collect();
        self
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = non_empty(hostname.into());
        self
    }

    pub fn with_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = non_empty(app_id.into()).map(|a| normalize_app_id(&a));
        self
    }

    pub fn with_instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = non_empty(instance_id.into());
        self
    }

    pub fn with_start_time(mut self, start_time: i64) -> Self {
        self.start_time = Some(normalize_time(start_time));
        self
    }

    pub fn with_end_time(mut self, end_time: i64) -> Self {
        self.end_time = Some(normalize_time(end_time));
        self
    }

    /// [start, end)
    pub fn with_time_range(self, start_time: i64, end_time: i64) -> Self {
        self.with_start_time(start_time).with_end_time(end_time)
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Limit::Rows(limit);
        self
    }

    pub fn with_fetch_size(mut self, fetch_size: u32) -> Self {
        self.fetch_size = Some(fetch_size);
        self
    }

    pub fn grouped(mut self, grouped: bool) -> Self {
        self.grouped = grouped;
        self
    }

    pub fn set_no_limit(&mut self) {
        self.limit = Limit::Unlimited;
    }

    /// Insertion-ordered; a repeated column/direction is ignored.
    pub fn add_order_by(&mut self, order: OrderBy) {
        if !self.order_by.contains(&order) {
            self.order_by.push(order);
        }
    }
}

impl Condition for DefaultCondition {
    fn metric_names(&self) -> Option<&[String]> {
        if self.metric_names.is_empty() {
            None
        } else {
            Some(&self.metric_names)
        }
    }

    fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    fn app_id(&self) -> Option<&str> {
        self.app_id.as_deref()
    }

    fn instance_id(&self) -> Option<&str> {
        self.instance_id.as_deref()
    }

    fn start_time(&self) -> Option<i64> {
        self.start_time
    }

    fn end_time(&self) -> Option<i64> {
        self.end_time
    }

    fn limit(&self) -> Limit {
        self.limit
    }

    fn fetch_size(&self) -> Option<u32> {
        self.fetch_size
    }

    fn order_by(&self) -> &[OrderBy] {
        &self.order_by
    }

    fn is_grouped(&self) -> bool {
        self.grouped
    }

    fn metric_names_clause(&self) -> Option<String> {
        let names = self.metric_names()?;
        Some(match self.name_match {
            NameMatch::Exact => exact_names_clause(names),
            NameMatch::Like => like_names_clause(names),
        })
    }
}
