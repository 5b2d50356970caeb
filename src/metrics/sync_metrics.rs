//! Sync pipeline metrics using OpenTelemetry.

use crate::core::ReloadOutcome;
use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
use std::sync::Arc;
use std::time::Instant;

/// Metrics collector for change handling and proxy reloads.
///
/// # Examples
///
/// ```rust,no_run
/// use proxy_config_sync::metrics::SyncMetrics;
/// use proxy_config_sync::core::ReloadOutcome;
/// use opentelemetry::global;
///
/// let metrics = SyncMetrics::new(global::meter("proxy-config-sync"));
///
/// let timer = metrics.start_reload();
/// // ... run the reload pipeline ...
/// metrics.record_reload(timer, &ReloadOutcome::Succeeded);
/// ```
#[derive(Clone)]
pub struct SyncMetrics {
    notifications: Counter<u64>,
    notifications_ignored: Counter<u64>,
    write_failures: Counter<u64>,
    reloads: Counter<u64>,
    reload_duration: Histogram<f64>,
    active_subscriptions: Gauge<i64>,
    since_last_reload: Gauge<i64>,
    last_reload: Arc<parking_lot::Mutex<Option<Instant>>>,
}

impl SyncMetrics {
    /// Create a new metrics collector with the provided meter.
    pub fn new(meter: Meter) -> Self {
        let notifications = meter
            .u64_counter("proxy_config_sync.notifications")
            .with_description("Change notifications received")
            .build();

        let notifications_ignored = meter
            .u64_counter("proxy_config_sync.notifications.ignored")
            .with_description("Change notifications for entries that are not watched")
            .build();

        let write_failures = meter
            .u64_counter("proxy_config_sync.write.failures")
            .with_description("Local file writes that failed")
            .build();

        let reloads = meter
            .u64_counter("proxy_config_sync.reloads")
            .with_description("Reload attempts by outcome")
            .build();

        let reload_duration = meter
            .f64_histogram("proxy_config_sync.reload.duration")
            .with_description("Duration of the validate and apply commands in seconds")
            .with_unit("s")
            .build();

        let active_subscriptions = meter
            .i64_gauge("proxy_config_sync.subscriptions.active")
            .with_description("Number of registered change subscriptions")
            .build();

        let since_last_reload = meter
            .i64_gauge("proxy_config_sync.reload.age")
            .with_description("Time since the last successful reload in seconds")
            .with_unit("s")
            .build();

        Self {
            notifications,
            notifications_ignored,
            write_failures,
            reloads,
            reload_duration,
            active_subscriptions,
            since_last_reload,
            last_reload: Arc::new(parking_lot::Mutex::new(None)),
        }
    }

    /// Count a received change notification.
    pub fn record_notification(&self) {
        self.notifications.add(1, &[]);
    }

    /// Count a notification for an entry that is not watched.
    pub fn record_ignored(&self) {
        self.notifications_ignored.add(1, &[]);
    }

    /// Count a failed local write.
    pub fn record_write_failure(&self) {
        self.write_failures.add(1, &[]);
    }

    /// Start a reload timer.
    pub fn start_reload(&self) -> Instant {
        Instant::now()
    }

    /// Record the outcome of a reload started with [`SyncMetrics::start_reload`].
    pub fn record_reload(&self, start: Instant, outcome: &ReloadOutcome) {
        let attributes = [KeyValue::new("outcome", outcome.label())];
        self.reloads.add(1, &attributes);
        self.reload_duration
            .record(start.elapsed().as_secs_f64(), &attributes);

        if outcome.is_success() {
            *self.last_reload.lock() = Some(Instant::now());
        }
    }

    /// Update the number of active subscriptions.
    pub fn update_subscription_count(&self, count: i64) {
        self.active_subscriptions.record(count, &[]);
    }

    /// Publish the time since the last successful reload, if any happened.
    ///
    /// This should be called periodically.
    pub fn update_reload_age(&self) {
        if let Some(at) = *self.last_reload.lock() {
            self.since_last_reload
                .record(at.elapsed().as_secs() as i64, &[]);
        }
    }
}
