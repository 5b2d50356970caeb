//! # proxy-config-sync
//!
//! Keeps reverse-proxy configuration files in sync with a remote
//! configuration service and reloads the proxy whenever they change.
//!
//! ## Overview
//!
//! `proxy-config-sync` watches a fixed set of entries, each mapping a remote
//! `(dataId, group)` pair to a local file:
//! - An initial sync fetches every entry and writes its file (fatal on error)
//! - A change subscription per entry delivers new content as it is published
//! - Each change overwrites the file, validates the proxy config, then reloads
//! - Optional operator alerts report the result of every change
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use proxy_config_sync::prelude::*;
//!
//! # async fn example() -> proxy_config_sync::error::Result<()> {
//! let settings = ArgsSource::new(
//!     "10.0.0.5",
//!     8848,
//!     "prod",
//!     "app.conf*DEFAULT_GROUP*/etc/nginx/conf.d/app.conf",
//! )
//! .load_validated()?;
//!
//! let orchestrator = Orchestrator::builder_from_settings(&settings)?.build()?;
//! orchestrator
//!     .run_until(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `metrics`: OpenTelemetry counters for notifications and reloads

#![warn(missing_docs, rust_2024_compatibility)]
#![deny(unsafe_code)]

pub mod core;
pub mod error;
pub mod notify;
pub mod remote;
pub mod sources;

#[cfg(feature = "metrics")]
pub mod metrics;

/// Convenient re-exports for common usage patterns.
pub mod prelude {
    pub use crate::core::{
        ChangeOutcome, Orchestrator, OrchestratorBuilder, ReloadInvoker, ReloadOutcome,
        WatchedEntry, WatchedEntrySet,
    };
    pub use crate::error::{Result, SyncError, ValidationError};
    pub use crate::notify::AlertNotifier;
    pub use crate::remote::{NacosClient, RemoteConfigClient};
    pub use crate::sources::{ArgsSource, ConfigurationSource, FileSource, SyncSettings};

    #[cfg(feature = "metrics")]
    pub use crate::metrics::SyncMetrics;
}
