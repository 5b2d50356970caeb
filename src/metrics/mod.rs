//! Built-in metrics for the sync pipeline.
//!
//! Provides OpenTelemetry metrics tracking:
//! - Change notifications received and ignored
//! - Local write failures
//! - Reload outcomes and duration
//! - Active subscriptions
//! - Time since the last successful reload
//!
//! # Examples
//!
//! ```rust,no_run
//! use proxy_config_sync::metrics::SyncMetrics;
//! use opentelemetry::global;
//!
//! let metrics = SyncMetrics::new(global::meter("proxy-config-sync"));
//! metrics.record_notification();
//! ```

mod sync_metrics;

pub use sync_metrics::SyncMetrics;
