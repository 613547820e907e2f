// Domain models: raw samples, host/cluster aggregates and their keys.

mod aggregate;
mod metric;

pub use aggregate::{ClusterAggregate, ClusterMetricKey, HostAggregate, HostMetricKey, MetricAggregate};
pub use metric::{MetricPoint, SampleValues};

/// Reserved app id for host-level metrics; kept verbatim by [`normalize_app_id`].
pub const HOST_APP_ID: &str = "HOST";

/// Canonical app id: lower-case, except the reserved host-level literal.
pub fn normalize_app_id(app_id: &str) -> String {
    if app_id == HOST_APP_ID {
        app_id.to_string()
    } else {
        app_id.to_lowercase()
    }
}

/// Absent instance ids are stored as "" so composite keys stay comparable.
pub(crate) fn instance_to_column(instance_id: Option<&str>) -> &str {
    instance_id.unwrap_or("")
}

pub(crate) fn instance_from_column(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}
