// Aggregate rows: one per key and bucket start. Average is derived, never stored.

use serde::{Deserialize, Serialize};

/// The stored quadruple. `count` is a sample count, or a hosts count for the
/// cluster minute table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricAggregate {
    pub sum: f64,
    pub count: u64,
    pub max: f64,
    pub min: f64,
}

impl MetricAggregate {
    pub fn new(sum: f64, count: u64, max: f64, min: f64) -> Self {
        Self {
            sum,
            count,
            max,
            min,
        }
    }

    /// Quadruple for a series of values; `None` when the series is empty.
    pub fn from_values<I>(values: I) -> Option<Self>
    where
        I: IntoIterator<Item = f64>,
    {
        let mut iter = values.into_iter();
        let first = iter.next()?;
        let mut agg = Self::new(first, 1, first, first);
        for v in iter {
            agg.sum += v;
            agg.count += 1;
            agg.max = agg.max.max(v);
            agg.min = agg.min.min(v);
        }
        Some(agg)
    }

    /// Folds `other` into `self`: sums add, counts add, extremes widen.
    pub fn merge(&mut self, other: &MetricAggregate) {
        self.sum += other.sum;
        self.count = self.count.saturating_add(other.count);
        self.max = self.max.max(other.max);
        self.min = self.min.min(other.min);
    }

    /// Associative fold of many quadruples; `None` when there are none.
    pub fn fold<'a, I>(aggs: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a MetricAggregate>,
    {
        let mut iter = aggs.into_iter();
        let mut acc = *iter.next()?;
        for a in iter {
            acc.merge(a);
        }
        Some(acc)
    }

    /// sum / count, or `None` for a zero count.
    pub fn avg(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / self.count as f64)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostMetricKey {
    pub metric_name: String,
    pub hostname: String,
    pub app_id: String,
    #[serde(default)]
    pub instance_id: Option<String>,
}

impl HostMetricKey {
    pub fn cluster_key(&self) -> ClusterMetricKey {
        ClusterMetricKey {
            metric_name: self.metric_name.clone(),
            app_id: self.app_id.clone(),
            instance_id: self.instance_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterMetricKey {
    pub metric_name: String,
    pub app_id: String,
    #[serde(default)]
    pub instance_id: Option<String>,
}

/// Per-host aggregate at minute or hour grain; `server_time` is the bucket start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostAggregate {
    #[serde(flatten)]
    pub key: HostMetricKey,
    pub server_time: i64,
    #[serde(default)]
    pub units: String,
    #[serde(flatten)]
    pub aggregate: MetricAggregate,
}

impl HostAggregate {
    pub fn avg(&self) -> Option<f64> {
        self.aggregate.avg()
    }
}

/// Cross-host aggregate; `server_time` is the bucket start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterAggregate {
    #[serde(flatten)]
    pub key: ClusterMetricKey,
    pub server_time: i64,
    #[serde(default)]
    pub units: String,
    #[serde(flatten)]
    pub aggregate: MetricAggregate,
}

impl ClusterAggregate {
    pub fn avg(&self) -> Option<f64> {
        self.aggregate.avg()
    }
}
