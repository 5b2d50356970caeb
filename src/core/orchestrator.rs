//! Watch-and-reconcile orchestration.

use crate::core::{
    EntryRegistry, LocalFileWriter, ReloadInvoker, ReloadOutcome, ReloadPhase, WatchedEntry,
    WatchedEntrySet,
};
use crate::error::{Result, SyncError};
use crate::notify::{AlertNotifier, WebhookTransport, local_hostname};
use crate::remote::{
    ChangeEvent, ChangeListener, ChangeNotification, FetchFailure, NacosClientBuilder,
    RemoteConfigClient,
};
use crate::sources::SyncSettings;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[cfg(feature = "metrics")]
use crate::metrics::SyncMetrics;

/// What happened to one change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeOutcome {
    /// The notification did not match a watched entry.
    Ignored,
    /// The local file could not be written; no reload was attempted.
    WriteFailed,
    /// A change was reported but its content could not be fetched; the local
    /// file was left untouched.
    FetchFailed,
    /// The file was written and the reload pipeline ran.
    Reloaded(ReloadOutcome),
}

/// Summary of a successful startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartReport {
    /// Entries fetched and written during the initial sync.
    pub synced: usize,
    /// Subscriptions registered.
    pub subscribed: usize,
    /// Subscriptions that could not be registered.
    pub subscribe_failures: usize,
}

/// Keeps local files in sync with the remote service and reloads the proxy.
///
/// Startup runs the initial sync (fatal on any error), publishes the entry
/// set, and registers one subscription per entry. Every change notification
/// is then handled on its own task; handling is serialized per entry so that
/// overlapping notifications for one file never interleave their write and
/// reload.
///
/// # Examples
///
/// ```rust,no_run
/// use proxy_config_sync::core::Orchestrator;
/// use proxy_config_sync::sources::{ConfigurationSource, FileSource};
///
/// # async fn example() -> proxy_config_sync::error::Result<()> {
/// let settings = FileSource::new("sync.yaml").load_validated()?;
/// let orchestrator = Orchestrator::builder_from_settings(&settings)?.build()?;
///
/// orchestrator
///     .run_until(async {
///         let _ = tokio::signal::ctrl_c().await;
///     })
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct Orchestrator {
    client: Arc<dyn RemoteConfigClient>,
    entries: WatchedEntrySet,
    registry: EntryRegistry,
    writer: LocalFileWriter,
    reloader: ReloadInvoker,
    alerts: AlertNotifier,
    #[cfg(feature = "metrics")]
    metrics: Option<SyncMetrics>,
}

impl Orchestrator {
    /// Create a new builder.
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// Create a builder wired to the services described by `settings`.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry list is invalid, a reload command is
    /// empty, or an HTTP client cannot be constructed.
    pub fn builder_from_settings(settings: &SyncSettings) -> Result<OrchestratorBuilder> {
        OrchestratorBuilder::from_settings(settings)
    }

    /// The registry change notifications are resolved against.
    pub fn registry(&self) -> &EntryRegistry {
        &self.registry
    }

    /// The entries this orchestrator keeps in sync.
    pub fn entries(&self) -> &WatchedEntrySet {
        &self.entries
    }

    /// Run startup and then wait for `shutdown` to complete.
    ///
    /// `shutdown` is raced against startup as well, so a shutdown request
    /// during the initial sync ends the run cleanly without waiting for the
    /// remote service. In-flight change handlers are not drained; they are
    /// abandoned when the runtime shuts down.
    ///
    /// # Errors
    ///
    /// Returns an error if startup fails before `shutdown` completes.
    pub async fn run_until<F>(self: &Arc<Self>, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut shutdown = std::pin::pin!(shutdown);

        tokio::select! {
            started = self.start() => {
                let report = started?;
                info!(
                    synced = report.synced,
                    subscribed = report.subscribed,
                    subscribe_failures = report.subscribe_failures,
                    "watching for config changes"
                );
            }
            () = &mut shutdown => {
                info!("shutdown requested during startup");
                return Ok(());
            }
        }

        shutdown.await;
        info!("shutting down");
        Ok(())
    }

    /// Initial sync, registry publish, and subscription registration.
    ///
    /// # Errors
    ///
    /// Returns the first fetch or write error of the initial sync. Failed
    /// subscriptions are logged and counted in the report, not returned.
    pub async fn start(self: &Arc<Self>) -> Result<StartReport> {
        let synced = self.initial_sync().await?;
        self.registry.publish(self.entries.clone())?;

        let listener = self.listener();
        let mut subscribed = 0;
        let mut subscribe_failures = 0;
        for entry in &self.entries {
            match self
                .client
                .subscribe(&entry.remote_id, &entry.group, Arc::clone(&listener))
                .await
            {
                Ok(()) => subscribed += 1,
                Err(e) => {
                    error!(
                        remote_id = %entry.remote_id,
                        group = %entry.group,
                        error = %e,
                        "subscription failed"
                    );
                    subscribe_failures += 1;
                }
            }
        }

        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.metrics {
            metrics.update_subscription_count(subscribed as i64);
        }

        Ok(StartReport {
            synced,
            subscribed,
            subscribe_failures,
        })
    }

    async fn initial_sync(&self) -> Result<usize> {
        for entry in &self.entries {
            let content = self.client.fetch(&entry.remote_id, &entry.group).await?;
            self.writer.write(&entry.local_path, &content)?;
            info!(
                remote_id = %entry.remote_id,
                group = %entry.group,
                path = %entry.local_path.display(),
                "initial sync wrote file"
            );
        }
        Ok(self.entries.len())
    }

    /// Listener that handles each subscription event on its own task.
    ///
    /// Holds only a weak reference, so subscriptions do not keep the
    /// orchestrator alive. Must be invoked within a tokio runtime.
    pub fn listener(self: &Arc<Self>) -> ChangeListener {
        let orchestrator = Arc::downgrade(self);
        Arc::new(move |event: ChangeEvent| {
            let Some(orchestrator) = orchestrator.upgrade() else {
                debug!(remote_id = %event.remote_id(), "orchestrator gone, dropping event");
                return;
            };
            tokio::spawn(async move {
                orchestrator.handle_event(event).await;
            });
        })
    }

    /// Dispatch one subscription event.
    pub async fn handle_event(&self, event: ChangeEvent) -> ChangeOutcome {
        match event {
            ChangeEvent::Changed(notification) => self.handle_change(notification).await,
            ChangeEvent::FetchFailed(failure) => self.handle_fetch_failure(failure),
        }
    }

    /// Alert that a reported change could not be fetched.
    ///
    /// The local file and the proxy are left as they are. The client reports
    /// each failure streak once, so this raises one alert per streak.
    pub fn handle_fetch_failure(&self, failure: FetchFailure) -> ChangeOutcome {
        let Some(slot) = self.registry.slot(&failure.remote_id, &failure.group) else {
            debug!(
                remote_id = %failure.remote_id,
                group = %failure.group,
                "ignoring fetch failure for unwatched entry"
            );
            return ChangeOutcome::Ignored;
        };
        let entry = slot.entry();

        error!(
            remote_id = %entry.remote_id,
            group = %entry.group,
            reason = %failure.reason,
            "changed config could not be fetched"
        );
        self.alerts.notify(format!(
            "failed to fetch {} ({}): {}; {} left unchanged",
            entry.remote_id,
            entry.group,
            failure.reason,
            entry.local_path.display()
        ));
        ChangeOutcome::FetchFailed
    }

    /// Write the new content of a watched entry and reload the proxy.
    ///
    /// Notifications are matched on `(remote_id, group)`; anything else is
    /// ignored. Failures are logged and alerted, never returned.
    pub async fn handle_change(&self, notification: ChangeNotification) -> ChangeOutcome {
        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.metrics {
            metrics.record_notification();
        }

        let Some(slot) = self
            .registry
            .slot(&notification.remote_id, &notification.group)
        else {
            debug!(
                namespace = %notification.namespace,
                remote_id = %notification.remote_id,
                group = %notification.group,
                "ignoring notification for unwatched entry"
            );
            #[cfg(feature = "metrics")]
            if let Some(metrics) = &self.metrics {
                metrics.record_ignored();
            }
            return ChangeOutcome::Ignored;
        };

        let _guard = slot.lock().await;
        let entry = slot.entry();

        if let Err(e) = self.writer.write(&entry.local_path, &notification.content) {
            error!(remote_id = %entry.remote_id, error = %e, "failed to update local file");
            #[cfg(feature = "metrics")]
            if let Some(metrics) = &self.metrics {
                metrics.record_write_failure();
            }
            self.alerts.notify(format!(
                "failed to update {} ({}): {}",
                entry.local_path.display(),
                entry.remote_id,
                e
            ));
            return ChangeOutcome::WriteFailed;
        }
        info!(
            remote_id = %entry.remote_id,
            path = %entry.local_path.display(),
            bytes = notification.content.len(),
            "local file updated"
        );

        #[cfg(feature = "metrics")]
        let timer = self.metrics.as_ref().map(SyncMetrics::start_reload);

        let outcome = self.reloader.reload().await;

        #[cfg(feature = "metrics")]
        if let (Some(metrics), Some(timer)) = (&self.metrics, timer) {
            metrics.record_reload(timer, &outcome);
        }

        if !outcome.is_success() {
            warn!(
                remote_id = %entry.remote_id,
                outcome = outcome.label(),
                "file updated but proxy not reloaded"
            );
        }
        self.alerts.notify(self.alert_message(entry, &outcome));

        ChangeOutcome::Reloaded(outcome)
    }

    fn alert_message(&self, entry: &WatchedEntry, outcome: &ReloadOutcome) -> String {
        let target = format!("{} ({})", entry.local_path.display(), entry.remote_id);
        match outcome {
            ReloadOutcome::ValidationFailed { .. } => format!(
                "config test `{}` failed for {}; reload skipped",
                self.reloader.validate_command(),
                target
            ),
            ReloadOutcome::ApplyFailed { .. } => format!(
                "reload `{}` failed for {}",
                self.reloader.apply_command(),
                target
            ),
            ReloadOutcome::TimedOut { phase } => {
                let command = match phase {
                    ReloadPhase::Validate => self.reloader.validate_command(),
                    ReloadPhase::Apply => self.reloader.apply_command(),
                };
                format!("`{}` timed out for {}", command, target)
            }
            ReloadOutcome::Succeeded => format!(
                "reload `{}` succeeded for {}",
                self.reloader.apply_command(),
                target
            ),
        }
    }
}

/// Builder for constructing an [`Orchestrator`].
pub struct OrchestratorBuilder {
    client: Option<Arc<dyn RemoteConfigClient>>,
    entries: Option<WatchedEntrySet>,
    reloader: Option<ReloadInvoker>,
    alerts: AlertNotifier,
    #[cfg(feature = "metrics")]
    metrics: Option<SyncMetrics>,
}

impl OrchestratorBuilder {
    /// Create a new builder with alerts disabled.
    pub fn new() -> Self {
        Self {
            client: None,
            entries: None,
            reloader: None,
            alerts: AlertNotifier::disabled(),
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    /// Create a builder wired to the services described by `settings`:
    /// a Nacos client, the configured reload commands, and (when enabled) a
    /// webhook alert transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry list is invalid, a reload command is
    /// empty, or an HTTP client cannot be constructed.
    pub fn from_settings(settings: &SyncSettings) -> Result<Self> {
        let entries = settings.entry_set()?;
        let client = NacosClientBuilder::from_settings(&settings.server).build()?;

        let validate = settings.reload.test_spec().ok_or_else(|| {
            SyncError::ValidationError("reload.test_command must not be empty".to_string())
        })?;
        let apply = settings.reload.reload_spec().ok_or_else(|| {
            SyncError::ValidationError("reload.reload_command must not be empty".to_string())
        })?;
        let mut reloader = ReloadInvoker::new(validate, apply);
        if let Some(deadline) = settings.reload.timeout() {
            reloader = reloader.with_timeout(deadline);
        }

        let alerts = if settings.alert.enabled {
            let url = settings.alert.url.clone().ok_or_else(|| {
                SyncError::ValidationError(
                    "alert.url is required when alerting is enabled".to_string(),
                )
            })?;
            let transport =
                WebhookTransport::new(url, Duration::from_millis(settings.server.timeout_ms))?;
            let label = settings
                .alert
                .host_label
                .clone()
                .unwrap_or_else(local_hostname);
            AlertNotifier::new(Arc::new(transport), label)
        } else {
            AlertNotifier::disabled()
        };

        Ok(Self::new()
            .with_client(Arc::new(client))
            .with_entries(entries)
            .with_reloader(reloader)
            .with_alerts(alerts))
    }

    /// Set the remote configuration client.
    pub fn with_client(mut self, client: Arc<dyn RemoteConfigClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Set the entries to keep in sync.
    pub fn with_entries(mut self, entries: WatchedEntrySet) -> Self {
        self.entries = Some(entries);
        self
    }

    /// Set the reload pipeline.
    pub fn with_reloader(mut self, reloader: ReloadInvoker) -> Self {
        self.reloader = Some(reloader);
        self
    }

    /// Set the alert notifier.
    pub fn with_alerts(mut self, alerts: AlertNotifier) -> Self {
        self.alerts = alerts;
        self
    }

    /// Record pipeline metrics.
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, metrics: SyncMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the orchestrator.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Other` if the client, entries, or reloader is missing.
    pub fn build(self) -> Result<Arc<Orchestrator>> {
        let client = self
            .client
            .ok_or_else(|| SyncError::Other("a remote client is required".to_string()))?;
        let entries = self
            .entries
            .ok_or_else(|| SyncError::Other("watched entries are required".to_string()))?;
        let reloader = self
            .reloader
            .ok_or_else(|| SyncError::Other("a reload invoker is required".to_string()))?;

        Ok(Arc::new(Orchestrator {
            client,
            entries,
            registry: EntryRegistry::new(),
            writer: LocalFileWriter::new(),
            reloader,
            alerts: self.alerts,
            #[cfg(feature = "metrics")]
            metrics: self.metrics,
        }))
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
