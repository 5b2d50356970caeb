//! Settings describing one run of the synchronizer.

use crate::core::{CommandSpec, Validate, WatchedEntry, WatchedEntrySet};
use crate::error::{Result, ValidationError};
use serde::Deserialize;
use std::time::Duration;

/// Everything needed to start the synchronizer.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncSettings {
    /// Remote configuration service connection.
    pub server: ServerSettings,
    /// Entries to keep in sync.
    #[serde(default)]
    pub files: Vec<WatchedEntry>,
    /// Operator alerting.
    #[serde(default)]
    pub alert: AlertSettings,
    /// Commands used to reload the proxy.
    #[serde(default)]
    pub reload: ReloadSettings,
}

/// Connection settings for the remote configuration service.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// Host name or IP address.
    #[serde(default)]
    pub address: String,
    /// TCP port.
    #[serde(default)]
    pub port: u16,
    /// Namespace (tenant) identifier.
    #[serde(default)]
    pub namespace: String,
    /// URL scheme, `http` or `https`.
    #[serde(default = "default_scheme")]
    pub scheme: String,
    /// Context path the service is mounted under.
    #[serde(default = "default_context_path")]
    pub context_path: String,
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// How long the service may hold a change long-poll, in milliseconds.
    #[serde(default = "default_long_poll_timeout_ms")]
    pub long_poll_timeout_ms: u64,
}

impl ServerSettings {
    /// Connection settings with default scheme, context path, and timeouts.
    pub fn new(address: impl Into<String>, port: u16, namespace: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            port,
            namespace: namespace.into(),
            scheme: default_scheme(),
            context_path: default_context_path(),
            timeout_ms: default_timeout_ms(),
            long_poll_timeout_ms: default_long_poll_timeout_ms(),
        }
    }
}

/// Operator alert settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlertSettings {
    /// Whether alerts are sent at all.
    #[serde(default)]
    pub enabled: bool,
    /// Webhook endpoint alerts are posted to.
    #[serde(default)]
    pub url: Option<String>,
    /// Label prefixed to every alert; defaults to the host name.
    #[serde(default)]
    pub host_label: Option<String>,
}

/// Commands run against the proxy after a file changed.
#[derive(Debug, Clone, Deserialize)]
pub struct ReloadSettings {
    /// Configuration test command line.
    #[serde(default = "default_test_command")]
    pub test_command: String,
    /// Reload command line.
    #[serde(default = "default_reload_command")]
    pub reload_command: String,
    /// Deadline for each command in seconds; `0` disables the deadline.
    #[serde(default = "default_reload_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ReloadSettings {
    fn default() -> Self {
        Self {
            test_command: default_test_command(),
            reload_command: default_reload_command(),
            timeout_secs: default_reload_timeout_secs(),
        }
    }
}

impl ReloadSettings {
    /// The configuration test command, if non-empty.
    pub fn test_spec(&self) -> Option<CommandSpec> {
        CommandSpec::from_words(self.test_command.split_whitespace())
    }

    /// The reload command, if non-empty.
    pub fn reload_spec(&self) -> Option<CommandSpec> {
        CommandSpec::from_words(self.reload_command.split_whitespace())
    }

    /// Per-command deadline.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

impl SyncSettings {
    /// The watched entries as a validated set.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::ParseError` for an empty list, empty fields, or
    /// duplicate entries.
    pub fn entry_set(&self) -> Result<WatchedEntrySet> {
        WatchedEntrySet::from_entries(self.files.clone())
    }
}

impl Validate for SyncSettings {
    fn validate(&self) -> std::result::Result<(), ValidationError> {
        let mut problems = Vec::new();

        if self.server.address.trim().is_empty() {
            problems.push(ValidationError::invalid_field(
                "server.address",
                "must not be empty",
            ));
        }
        if self.server.port == 0 {
            problems.push(ValidationError::invalid_field(
                "server.port",
                "must be non-zero",
            ));
        }
        if self.server.namespace.trim().is_empty() {
            problems.push(ValidationError::invalid_field(
                "server.namespace",
                "must not be empty",
            ));
        }
        if !matches!(self.server.scheme.as_str(), "http" | "https") {
            problems.push(ValidationError::invalid_field(
                "server.scheme",
                format!("must be http or https, got '{}'", self.server.scheme),
            ));
        }

        if let Err(e) = self.entry_set() {
            problems.push(ValidationError::invalid_field("files", e.to_string()));
        }

        if self.reload.test_spec().is_none() {
            problems.push(ValidationError::invalid_field(
                "reload.test_command",
                "must not be empty",
            ));
        }
        if self.reload.reload_spec().is_none() {
            problems.push(ValidationError::invalid_field(
                "reload.reload_command",
                "must not be empty",
            ));
        }

        let has_url = self
            .alert
            .url
            .as_deref()
            .is_some_and(|url| !url.trim().is_empty());
        if self.alert.enabled && !has_url {
            problems.push(ValidationError::invalid_field(
                "alert.url",
                "is required when alerting is enabled",
            ));
        }

        ValidationError::from_problems(problems)
    }
}

fn default_scheme() -> String {
    "http".to_string()
}

fn default_context_path() -> String {
    "/nacos".to_string()
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_long_poll_timeout_ms() -> u64 {
    30_000
}

fn default_test_command() -> String {
    "nginx -t".to_string()
}

fn default_reload_command() -> String {
    "nginx -s reload".to_string()
}

fn default_reload_timeout_secs() -> u64 {
    60
}
