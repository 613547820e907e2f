// Background worker: raw -> minute aggregates (host + cluster), then minute -> hourly.
// Runs every interval_secs when aggregation.enabled is true. Expired rows are pruned
// per table TTL; VACUUM runs on a configurable schedule (cron expression or fixed interval).

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, info, instrument, warn};

use crate::aggregation::{Aggregator, AggregatorKind};
use crate::config::AggregationConfig;
use crate::metric_repo::{MetricRepo, now_ms};
use crate::schema::{MS_PER_HOUR, MS_PER_MINUTE};

/// Minute windows replayed per tick after downtime. Longer gaps restart from the
/// last completed hour.
const MAX_CATCHUP_MINUTES: i64 = 120;

/// Config for the aggregation worker.
#[derive(Debug, Clone)]
pub struct AggregationWorkerConfig {
    pub interval_secs: u64,
    pub delay_ms: i64,
    pub prune_interval_secs: u64,
    /// Optional cron expression for VACUUM (e.g. "0 0 3 * * *" = 03:00 daily). Uses local time.
    pub vacuum_schedule: Option<String>,
    /// Run VACUUM every N seconds when vacuum_schedule is not set.
    pub vacuum_interval_secs: u64,
}

impl From<&AggregationConfig> for AggregationWorkerConfig {
    fn from(c: &AggregationConfig) -> Self {
        Self {
            interval_secs: c.interval_secs,
            delay_ms: (c.delay_secs as i64).saturating_mul(1000),
            prune_interval_secs: c.prune_interval_secs,
            vacuum_schedule: c.vacuum_schedule.clone(),
            vacuum_interval_secs: c.vacuum_interval_secs,
        }
    }
}

/// Latest fully elapsed `[start, end)` window of `grain_ms`, aligned to the grain,
/// once `delay_ms` has passed since it closed.
pub fn completed_window(now_ms: i64, delay_ms: i64, grain_ms: i64) -> (i64, i64) {
    let end = (now_ms - delay_ms).div_euclid(grain_ms) * grain_ms;
    (end - grain_ms, end)
}

/// Progress of the scheduler: end of the last window written at each grain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerState {
    pub last_minute_end: Option<i64>,
    pub last_hour_end: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub minute_windows: u32,
    pub hourly_windows: u32,
}

async fn run_pair(repo: &Arc<MetricRepo>, kinds: [AggregatorKind; 2], start: i64, end: i64) -> bool {
    let mut ok = true;
    for kind in kinds {
        // both kinds run even if the first fails; the window is retried as a whole
        ok &= Aggregator::new(repo.clone(), kind).run(start, end).await;
    }
    ok
}

/// Runs every minute window completed since the last tick, then the hourly window
/// once all of its minutes are written. With no progress recorded, minutes are
/// rebuilt from the start of the last completed hour so that hour is whole. A window is marked done only when both the
/// host and cluster aggregators succeed; otherwise the next tick re-runs it.
pub async fn run_one_tick(
    repo: &Arc<MetricRepo>,
    state: &mut SchedulerState,
    now_ms: i64,
    delay_ms: i64,
) -> TickReport {
    let mut report = TickReport::default();

    let (_, latest_end) = completed_window(now_ms, delay_ms, MS_PER_MINUTE);
    let (hour_start, hour_end) = completed_window(now_ms, delay_ms, MS_PER_HOUR);
    let catchup_floor = latest_end - MAX_CATCHUP_MINUTES * MS_PER_MINUTE;
    let mut start = match state.last_minute_end {
        Some(end) if end >= latest_end => latest_end,
        Some(end) if end >= catchup_floor => end,
        // no progress yet, or a gap too long to replay
        _ => hour_start.max(catchup_floor),
    };
    while start < latest_end {
        let end = start + MS_PER_MINUTE;
        if !run_pair(
            repo,
            [AggregatorKind::HostMinute, AggregatorKind::ClusterMinute],
            start,
            end,
        )
        .await
        {
            break;
        }
        state.last_minute_end = Some(end);
        report.minute_windows += 1;
        start = end;
    }

    let minutes_done = state.last_minute_end.is_some_and(|e| e >= hour_end);
    let hour_pending = state.last_hour_end.is_none_or(|e| e < hour_end);
    if minutes_done && hour_pending {
        if run_pair(
            repo,
            [AggregatorKind::HostHourly, AggregatorKind::ClusterHourly],
            hour_start,
            hour_end,
        )
        .await
        {
            state.last_hour_end = Some(hour_end);
            report.hourly_windows += 1;
        }
    } else {
        debug!(hour_end, minutes_done, hour_pending, "hourly aggregation not due");
    }

    report
}

/// Spawns the aggregation worker. Stops when `shutdown_rx` fires. Returns a join handle.
pub fn spawn(
    repo: Arc<MetricRepo>,
    config: AggregationWorkerConfig,
    shutdown_rx: oneshot::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        run(repo, config, shutdown_rx).await;
    })
}

#[instrument(skip(repo, shutdown_rx), fields(interval_secs = config.interval_secs))]
async fn run(
    repo: Arc<MetricRepo>,
    config: AggregationWorkerConfig,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut agg_interval = tokio::time::interval(Duration::from_secs(config.interval_secs));
    agg_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut prune_interval = tokio::time::interval(Duration::from_secs(config.prune_interval_secs));
    prune_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let (vacuum_tx, mut vacuum_rx) = tokio::sync::mpsc::channel::<()>(1);
    let vacuum_handle = tokio::spawn(vacuum_scheduler(config.clone(), vacuum_tx));

    let mut state = SchedulerState::default();
    loop {
        tokio::select! {
            _ = agg_interval.tick() => {
                let report = run_one_tick(&repo, &mut state, now_ms(), config.delay_ms).await;
                debug!(
                    minute_windows = report.minute_windows,
                    hourly_windows = report.hourly_windows,
                    "aggregation tick"
                );
            }
            _ = prune_interval.tick() => {
                match repo.prune_all_expired().await {
                    Ok(n) if n > 0 => info!(rows_deleted = n, "pruned expired metrics"),
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "prune failed"),
                }
            }
            Some(()) = vacuum_rx.recv() => {
                if let Err(e) = repo.vacuum().await {
                    warn!(error = %e, "vacuum failed");
                } else {
                    info!("vacuum complete");
                }
            }
            _ = &mut shutdown_rx => {
                info!("aggregation worker stopping");
                break;
            }
        }
    }
    vacuum_handle.abort();
}

/// Sends a message on `tx` at each VACUUM time (cron or fixed interval). Uses local time for cron.
async fn vacuum_scheduler(config: AggregationWorkerConfig, tx: tokio::sync::mpsc::Sender<()>) {
    if let Some(ref cron_str) = config.vacuum_schedule {
        let Ok(schedule) = cron::Schedule::from_str(cron_str) else {
            warn!(cron = %cron_str, "invalid vacuum_schedule; VACUUM will not run");
            return;
        };
        loop {
            let now = chrono::Local::now();
            let next = schedule.after(&now).next();
            if let Some(next) = next {
                let delay = (next - now).to_std().unwrap_or(Duration::from_secs(1));
                tokio::time::sleep(delay).await;
                if tx.send(()).await.is_err() {
                    break;
                }
            } else {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
        }
    } else {
        let interval = Duration::from_secs(config.vacuum_interval_secs);
        loop {
            tokio::time::sleep(interval).await;
            if tx.send(()).await.is_err() {
                break;
            }
        }
    }
}
