// Per-metric split: one name at a time over a wrapped condition.
//
// A composite-key range scan over many names cannot be pruned by key, so callers
// iterate the original names, set each as current, and issue one scan per name.

use super::{Condition, Limit, OrderBy, exact_names_clause};

#[derive(Debug, Clone)]
pub struct SplitByMetricNamesCondition<C> {
    inner: C,
    current_metric: Option<String>,
}

impl<C: Condition> SplitByMetricNamesCondition<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            current_metric: None,
        }
    }

    /// The full name set of the wrapped condition.
    pub fn original_metric_names(&self) -> Option<&[String]> {
        self.inner.metric_names()
    }

    pub fn set_current_metric(&mut self, metric_name: impl Into<String>) {
        self.current_metric = Some(metric_name.into());
    }

    pub fn current_metric(&self) -> Option<&str> {
        self.current_metric.as_deref()
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C: Condition> Condition for SplitByMetricNamesCondition<C> {
    fn metric_names(&self) -> Option<&[String]> {
        self.current_metric.as_ref().map(std::slice::from_ref)
    }

    fn hostname(&self) -> Option<&str> {
        self.inner.hostname()
    }

    fn app_id(&self) -> Option<&str> {
        self.inner.app_id()
    }

    fn instance_id(&self) -> Option<&str> {
        self.inner.instance_id()
    }

    fn start_time(&self) -> Option<i64> {
        self.inner.start_time()
    }

    fn end_time(&self) -> Option<i64> {
        self.inner.end_time()
    }

    fn limit(&self) -> Limit {
        self.inner.limit()
    }

    fn fetch_size(&self) -> Option<u32> {
        self.inner.fetch_size()
    }

    fn order_by(&self) -> &[OrderBy] {
        self.inner.order_by()
    }

    fn is_grouped(&self) -> bool {
        self.inner.is_grouped()
    }

    fn metric_names_clause(&self) -> Option<String> {
        self.metric_names().map(exact_names_clause)
    }

    fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
