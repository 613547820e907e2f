// Roll-up folds: pure grouping/reduction logic.
// Reading source rows and writing results lives in `aggregator`.
//
// Groups are kept in BTreeMaps so output order, and with it floating-point
// summation order, is the same on every run over the same source rows.

mod aggregator;

pub use aggregator::{Aggregator, AggregatorKind};

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use crate::models::{
    ClusterAggregate, ClusterMetricKey, HostAggregate, HostMetricKey, MetricAggregate, MetricPoint,
};

fn fold_into<K: Ord>(
    groups: &mut BTreeMap<K, (String, MetricAggregate)>,
    key: K,
    units: &str,
    agg: &MetricAggregate,
) {
    match groups.entry(key) {
        Entry::Vacant(e) => {
            e.insert((units.to_string(), *agg));
        }
        Entry::Occupied(mut e) => {
            let (group_units, group_agg) = e.get_mut();
            group_agg.merge(agg);
            if !units.is_empty() {
                *group_units = units.to_string();
            }
        }
    }
}

/// Raw samples -> one row per (metric, host, app, instance) at `bucket_start`.
/// Samples without values contribute nothing; groups with no samples emit no row.
pub fn aggregate_metric_records(points: &[MetricPoint], bucket_start: i64) -> Vec<HostAggregate> {
    let mut groups: BTreeMap<HostMetricKey, (String, MetricAggregate)> = BTreeMap::new();
    for p in points {
        if let Some(summary) = p.summary().filter(|s| s.count > 0) {
            fold_into(&mut groups, p.host_key(), &p.units, &summary);
        }
    }
    groups
        .into_iter()
        .map(|(key, (units, aggregate))| HostAggregate {
            key,
            server_time: bucket_start,
            units,
            aggregate,
        })
        .collect()
}

/// Finer host aggregates (e.g. minute) -> coarser ones (e.g. hour).
pub fn aggregate_host_aggregates(rows: &[HostAggregate], bucket_start: i64) -> Vec<HostAggregate> {
    let mut groups: BTreeMap<HostMetricKey, (String, MetricAggregate)> = BTreeMap::new();
    for r in rows.iter().filter(|r| r.aggregate.count > 0) {
        fold_into(&mut groups, r.key.clone(), &r.units, &r.aggregate);
    }
    groups
        .into_iter()
        .map(|(key, (units, aggregate))| HostAggregate {
            key,
            server_time: bucket_start,
            units,
            aggregate,
        })
        .collect()
}

/// Raw samples -> one row per (metric, app, instance) across hosts.
/// Each host contributes its window average to `sum` and 1 to the hosts count;
/// max/min are the extremes over every host.
pub fn aggregate_cluster_from_records(
    points: &[MetricPoint],
    bucket_start: i64,
) -> Vec<ClusterAggregate> {
    let mut groups: BTreeMap<ClusterMetricKey, (String, MetricAggregate)> = BTreeMap::new();
    for host in aggregate_metric_records(points, bucket_start) {
        let Some(avg) = host.avg() else {
            continue;
        };
        let contribution = MetricAggregate::new(avg, 1, host.aggregate.max, host.aggregate.min);
        fold_into(&mut groups, host.key.cluster_key(), &host.units, &contribution);
    }
    groups
        .into_iter()
        .map(|(key, (units, aggregate))| ClusterAggregate {
            key,
            server_time: bucket_start,
            units,
            aggregate,
        })
        .collect()
}

/// Cluster minute rows -> cluster hourly rows. The hourly count is the sum of
/// the minute hosts counts, so avg stays the mean per-host value.
pub fn aggregate_cluster_aggregates(
    rows: &[ClusterAggregate],
    bucket_start: i64,
) -> Vec<ClusterAggregate> {
    let mut groups: BTreeMap<ClusterMetricKey, (String, MetricAggregate)> = BTreeMap::new();
    for r in rows.iter().filter(|r| r.aggregate.count > 0) {
        fold_into(&mut groups, r.key.clone(), &r.units, &r.aggregate);
    }
    groups
        .into_iter()
        .map(|(key, (units, aggregate))| ClusterAggregate {
            key,
            server_time: bucket_start,
            units,
            aggregate,
        })
        .collect()
}
