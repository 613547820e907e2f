// Raw sample row (metric_record).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{ClusterMetricKey, HostMetricKey, MetricAggregate};

/// Either a pre-aggregated quadruple or sub-minute timestamp -> value pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SampleValues {
    Aggregate(MetricAggregate),
    Series(BTreeMap<i64, f64>),
}

impl SampleValues {
    /// Quadruple stored alongside the row; `None` for an empty series or a
    /// zero-count aggregate.
    pub fn summary(&self) -> Option<MetricAggregate> {
        match self {
            SampleValues::Aggregate(agg) => (agg.count > 0).then_some(*agg),
            SampleValues::Series(values) => MetricAggregate::from_values(values.values().copied()),
        }
    }
}

/// Keyed by (metric_name, hostname, app_id, instance_id, server_time).
/// `server_time` is assigned by the store when the sample is inserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricPoint {
    pub metric_name: String,
    pub hostname: String,
    pub app_id: String,
    #[serde(default)]
    pub instance_id: Option<String>,
    #[serde(default)]
    pub server_time: i64,
    pub start_time: i64,
    #[serde(default)]
    pub units: String,
    pub values: SampleValues,
}

impl MetricPoint {
    pub fn host_key(&self) -> HostMetricKey {
        HostMetricKey {
            metric_name: self.metric_name.clone(),
            hostname: self.hostname.clone(),
            app_id: self.app_id.clone(),
            instance_id: self.instance_id.clone(),
        }
    }

    pub fn cluster_key(&self) -> ClusterMetricKey {
        ClusterMetricKey {
            metric_name: self.metric_name.clone(),
            app_id: self.app_id.clone(),
            instance_id: self.instance_id.clone(),
        }
    }

    pub fn summary(&self) -> Option<MetricAggregate> {
        self.values.summary()
    }
}
