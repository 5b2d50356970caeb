//! Nacos configuration service client (open API v1).

use super::{
    ChangeEvent, ChangeListener, ChangeNotification, FetchFailure, RemoteConfigClient,
};
use crate::error::{Result, SyncError};
use crate::sources::ServerSettings;
use async_trait::async_trait;
use md5::{Digest, Md5};
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Separates the fields of one line in a listener request.
const WORD_SEPARATOR: char = '\u{2}';
/// Terminates one line in a listener request.
const LINE_SEPARATOR: char = '\u{1}';
/// Upper bound for the pause between rounds of a failing subscription.
const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(60);

type ConfigKey = (String, String);

/// Shared state used by the client and its long-poll tasks.
struct NacosInner {
    base_url: String,
    namespace: String,
    client: Client,
    request_timeout: Duration,
    long_poll_timeout: Duration,
    retry_delay: Duration,
    min_poll_interval: Duration,
    digests: RwLock<HashMap<ConfigKey, String>>,
}

impl NacosInner {
    fn configs_url(&self) -> String {
        format!("{}/v1/cs/configs", self.base_url)
    }

    fn listener_url(&self) -> String {
        format!("{}/v1/cs/configs/listener", self.base_url)
    }

    fn digest(&self, remote_id: &str, group: &str) -> Option<String> {
        let digests = match self.digests.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        digests
            .get(&(remote_id.to_string(), group.to_string()))
            .cloned()
    }

    fn remember(&self, remote_id: &str, group: &str, content: &str) {
        let mut digests = match self.digests.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        digests.insert(
            (remote_id.to_string(), group.to_string()),
            content_md5(content),
        );
    }

    async fn get_config(&self, remote_id: &str, group: &str) -> Result<String> {
        let mut query = vec![("dataId", remote_id), ("group", group)];
        if !self.namespace.is_empty() {
            query.push(("tenant", self.namespace.as_str()));
        }

        let response = self
            .client
            .get(self.configs_url())
            .query(&query)
            .send()
            .await
            .map_err(|e| {
                SyncError::fetch(remote_id, group, format!("HTTP request failed: {}", e))
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(SyncError::fetch(remote_id, group, "config not found"));
        }
        if !status.is_success() {
            return Err(SyncError::fetch(
                remote_id,
                group,
                format!(
                    "HTTP request failed with status {}: {}",
                    status,
                    status.canonical_reason().unwrap_or("Unknown")
                ),
            ));
        }

        let content = response.text().await.map_err(|e| {
            SyncError::fetch(remote_id, group, format!("Failed to read body: {}", e))
        })?;

        self.remember(remote_id, group, &content);
        Ok(content)
    }

    /// One long-poll round. Returns whether the server reported a change.
    async fn poll_once(&self, remote_id: &str, group: &str) -> Result<bool> {
        let md5 = self.digest(remote_id, group).unwrap_or_default();
        let line = listening_configs(remote_id, group, &md5, &self.namespace);

        let response = self
            .client
            .post(self.listener_url())
            .header(
                "Long-Pulling-Timeout",
                self.long_poll_timeout.as_millis().to_string(),
            )
            .timeout(self.long_poll_timeout + self.request_timeout)
            .form(&[("Listening-Configs", line)])
            .send()
            .await
            .map_err(|e| SyncError::fetch(remote_id, group, format!("long poll failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::fetch(
                remote_id,
                group,
                format!("long poll failed with status {}", status),
            ));
        }

        let body = response.text().await.map_err(|e| {
            SyncError::fetch(remote_id, group, format!("Failed to read body: {}", e))
        })?;
        Ok(!body.trim().is_empty())
    }
}

/// Client for the Nacos configuration service.
///
/// Fetches entries over HTTP and watches them with one long-poll task per
/// subscription. Long-poll tasks are aborted when the client is dropped.
///
/// # Examples
///
/// ```rust,no_run
/// use proxy_config_sync::remote::{NacosClient, RemoteConfigClient};
/// use std::time::Duration;
///
/// # async fn example() -> proxy_config_sync::error::Result<()> {
/// let client = NacosClient::builder()
///     .with_server("10.0.0.5", 8848)
///     .with_namespace("prod")
///     .with_timeout(Duration::from_secs(5))
///     .build()?;
///
/// let content = client.fetch("app.conf", "DEFAULT_GROUP").await?;
/// # Ok(())
/// # }
/// ```
pub struct NacosClient {
    inner: Arc<NacosInner>,
    listeners: Mutex<HashMap<ConfigKey, JoinHandle<()>>>,
}

impl NacosClient {
    /// Create a new builder for constructing a Nacos client.
    pub fn builder() -> NacosClientBuilder {
        NacosClientBuilder::new()
    }

    /// Base URL all requests are made against.
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Number of active subscriptions.
    pub fn subscription_count(&self) -> usize {
        lock_or_recover(&self.listeners).len()
    }
}

#[async_trait]
impl RemoteConfigClient for NacosClient {
    async fn fetch(&self, remote_id: &str, group: &str) -> Result<String> {
        let content = self.inner.get_config(remote_id, group).await?;
        debug!(remote_id, group, bytes = content.len(), "fetched config");
        Ok(content)
    }

    async fn subscribe(
        &self,
        remote_id: &str,
        group: &str,
        listener: ChangeListener,
    ) -> Result<()> {
        if remote_id.is_empty() || group.is_empty() {
            return Err(SyncError::subscribe(
                remote_id,
                group,
                "dataId and group must not be empty",
            ));
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| {
                SyncError::subscribe(remote_id, group, format!("no tokio runtime: {}", e))
            })?;

        let key = (remote_id.to_string(), group.to_string());
        let mut listeners = lock_or_recover(&self.listeners);
        if listeners.contains_key(&key) {
            return Err(SyncError::subscribe(remote_id, group, "already subscribed"));
        }

        let task = runtime.spawn(listen(
            Arc::clone(&self.inner),
            key.0.clone(),
            key.1.clone(),
            listener,
        ));
        listeners.insert(key, task);

        info!(remote_id, group, "subscribed to config changes");
        Ok(())
    }

    fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    fn name(&self) -> String {
        format!("nacos:{}", self.inner.base_url)
    }
}

impl Drop for NacosClient {
    fn drop(&mut self) {
        for (_, task) in lock_or_recover(&self.listeners).drain() {
            task.abort();
        }
    }
}

/// Doubling pause between rounds of a subscription that keeps failing.
struct Backoff {
    base: Duration,
    failures: u32,
}

impl Backoff {
    fn new(base: Duration) -> Self {
        Self { base, failures: 0 }
    }

    /// Record a failure. Returns whether it starts a new failure streak, and
    /// how long to pause before the next round.
    fn fail(&mut self) -> (bool, Duration) {
        let first = self.failures == 0;
        let delay = self
            .base
            .saturating_mul(2u32.saturating_pow(self.failures.min(16)))
            .min(MAX_RETRY_BACKOFF.max(self.base));
        self.failures = self.failures.saturating_add(1);
        (first, delay)
    }

    fn reset(&mut self) {
        self.failures = 0;
    }
}

/// Long-poll loop for one subscription. Runs until aborted.
///
/// A failed refetch is reported to the listener once per failure streak;
/// later failures of the same streak are only logged at debug level while the
/// loop backs off.
async fn listen(
    inner: Arc<NacosInner>,
    remote_id: String,
    group: String,
    listener: ChangeListener,
) {
    let mut poll_backoff = Backoff::new(inner.retry_delay);
    let mut fetch_backoff = Backoff::new(inner.retry_delay);

    loop {
        let round = Instant::now();
        match inner.poll_once(&remote_id, &group).await {
            Ok(false) => poll_backoff.reset(),
            Ok(true) => {
                poll_backoff.reset();
                let previous = inner.digest(&remote_id, &group);
                match inner.get_config(&remote_id, &group).await {
                    Ok(content) => {
                        fetch_backoff.reset();
                        if previous.as_deref() == Some(content_md5(&content).as_str()) {
                            debug!(
                                remote_id = %remote_id,
                                group = %group,
                                "change reported but content is unchanged"
                            );
                        } else {
                            info!(remote_id = %remote_id, group = %group, "config changed");
                            listener(ChangeEvent::Changed(ChangeNotification {
                                namespace: inner.namespace.clone(),
                                group: group.clone(),
                                remote_id: remote_id.clone(),
                                content,
                            }));
                        }
                    }
                    Err(e) => {
                        let (first, delay) = fetch_backoff.fail();
                        if first {
                            warn!(
                                remote_id = %remote_id,
                                group = %group,
                                error = %e,
                                "failed to fetch changed config"
                            );
                            listener(ChangeEvent::FetchFailed(FetchFailure {
                                namespace: inner.namespace.clone(),
                                group: group.clone(),
                                remote_id: remote_id.clone(),
                                reason: e.to_string(),
                            }));
                        } else {
                            debug!(
                                remote_id = %remote_id,
                                group = %group,
                                retry_in = ?delay,
                                "changed config still unavailable"
                            );
                        }
                        sleep(delay).await;
                        continue;
                    }
                }
            }
            Err(e) => {
                let (first, delay) = poll_backoff.fail();
                if first {
                    warn!(
                        remote_id = %remote_id,
                        group = %group,
                        error = %e,
                        "long poll failed, retrying"
                    );
                } else {
                    debug!(
                        remote_id = %remote_id,
                        group = %group,
                        error = %e,
                        retry_in = ?delay,
                        "long poll still failing"
                    );
                }
                sleep(delay).await;
                continue;
            }
        }

        // A server or proxy that answers without holding the poll must not
        // turn this loop into a busy spin.
        if let Some(rest) = inner.min_poll_interval.checked_sub(round.elapsed()) {
            sleep(rest).await;
        }
    }
}

/// Body line of a listener request: `dataId^Bgroup^Bmd5[^Btenant]^A`.
fn listening_configs(remote_id: &str, group: &str, md5: &str, namespace: &str) -> String {
    let capacity = remote_id.len() + group.len() + md5.len() + namespace.len() + 4;
    let mut line = String::with_capacity(capacity);
    line.push_str(remote_id);
    line.push(WORD_SEPARATOR);
    line.push_str(group);
    line.push(WORD_SEPARATOR);
    line.push_str(md5);
    if !namespace.is_empty() {
        line.push(WORD_SEPARATOR);
        line.push_str(namespace);
    }
    line.push(LINE_SEPARATOR);
    line
}

fn content_md5(content: &str) -> String {
    format!("{:x}", Md5::digest(content.as_bytes()))
}

fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("poisoned mutex encountered; recovering inner state");
            poisoned.into_inner()
        }
    }
}

/// Builder for constructing a `NacosClient`.
///
/// # Examples
///
/// ```rust,no_run
/// use proxy_config_sync::remote::NacosClient;
///
/// # fn example() -> proxy_config_sync::error::Result<()> {
/// let client = NacosClient::builder()
///     .with_server("nacos.internal", 8848)
///     .with_namespace("prod")
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct NacosClientBuilder {
    address: Option<String>,
    port: u16,
    base_url: Option<String>,
    scheme: String,
    context_path: String,
    namespace: String,
    timeout: Duration,
    long_poll_timeout: Duration,
    retry_delay: Duration,
    min_poll_interval: Duration,
}

impl NacosClientBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            address: None,
            port: 8848,
            base_url: None,
            scheme: "http".to_string(),
            context_path: "/nacos".to_string(),
            namespace: String::new(),
            timeout: Duration::from_secs(5),
            long_poll_timeout: Duration::from_secs(30),
            retry_delay: Duration::from_secs(2),
            min_poll_interval: Duration::from_millis(500),
        }
    }

    /// Create a builder from the `server` section of the settings.
    pub fn from_settings(settings: &ServerSettings) -> Self {
        Self::new()
            .with_server(settings.address.clone(), settings.port)
            .with_scheme(settings.scheme.clone())
            .with_context_path(settings.context_path.clone())
            .with_namespace(settings.namespace.clone())
            .with_timeout(Duration::from_millis(settings.timeout_ms))
            .with_long_poll_timeout(Duration::from_millis(settings.long_poll_timeout_ms))
    }

    /// Set the server address and port.
    pub fn with_server(mut self, address: impl Into<String>, port: u16) -> Self {
        self.address = Some(address.into());
        self.port = port;
        self
    }

    /// Use a complete base URL (including context path) instead of
    /// address, port, scheme, and context path.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the URL scheme. Default is `http`.
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// Set the context path. Default is `/nacos`.
    pub fn with_context_path(mut self, context_path: impl Into<String>) -> Self {
        self.context_path = context_path.into();
        self
    }

    /// Set the namespace (tenant) entries are read from.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set the request timeout.
    ///
    /// Default is 5 seconds.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set how long the server may hold a long-poll request.
    ///
    /// Default is 30 seconds.
    pub fn with_long_poll_timeout(mut self, timeout: Duration) -> Self {
        self.long_poll_timeout = timeout;
        self
    }

    /// Set the pause after a failed long-poll round.
    ///
    /// Default is 2 seconds.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set the shortest time one long-poll round may take; quicker answers
    /// are followed by a pause.
    ///
    /// Default is 500 milliseconds.
    pub fn with_min_poll_interval(mut self, interval: Duration) -> Self {
        self.min_poll_interval = interval;
        self
    }

    /// Build the client.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::ClientError` if:
    /// - Neither a server address nor a base URL is provided
    /// - The HTTP client cannot be constructed
    pub fn build(self) -> Result<NacosClient> {
        let base_url = match (self.base_url, self.address) {
            (Some(url), _) => url.trim_end_matches('/').to_string(),
            (None, Some(address)) if !address.is_empty() => {
                let context = self.context_path.trim_matches('/');
                if context.is_empty() {
                    format!("{}://{}:{}", self.scheme, address, self.port)
                } else {
                    format!("{}://{}:{}/{}", self.scheme, address, self.port, context)
                }
            }
            _ => {
                return Err(SyncError::ClientError(
                    "server address is required for NacosClient".to_string(),
                ));
            }
        };

        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| SyncError::ClientError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(NacosClient {
            inner: Arc::new(NacosInner {
                base_url,
                namespace: self.namespace,
                client,
                request_timeout: self.timeout,
                long_poll_timeout: self.long_poll_timeout,
                retry_delay: self.retry_delay,
                min_poll_interval: self.min_poll_interval,
                digests: RwLock::new(HashMap::new()),
            }),
            listeners: Mutex::new(HashMap::new()),
        })
    }
}

impl Default for NacosClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
