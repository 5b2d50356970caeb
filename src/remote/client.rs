//! Remote configuration client trait.

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// A change pushed by the remote service for one subscribed entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotification {
    /// Namespace the entry lives in.
    pub namespace: String,
    /// Group of the changed entry.
    pub group: String,
    /// Remote identifier of the changed entry.
    pub remote_id: String,
    /// The new content.
    pub content: String,
}

/// A reported change whose new content could not be retrieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    /// Namespace the entry lives in.
    pub namespace: String,
    /// Group of the entry.
    pub group: String,
    /// Remote identifier of the entry.
    pub remote_id: String,
    /// Why the content could not be fetched.
    pub reason: String,
}

/// What a subscription delivers to its listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// New content is available.
    Changed(ChangeNotification),
    /// A change was reported but fetching it failed.
    ///
    /// Delivered once per failure streak; the client stays quiet until a
    /// fetch for the entry succeeds again.
    FetchFailed(FetchFailure),
}

impl ChangeEvent {
    /// Remote identifier of the affected entry.
    pub fn remote_id(&self) -> &str {
        match self {
            Self::Changed(change) => &change.remote_id,
            Self::FetchFailed(failure) => &failure.remote_id,
        }
    }

    /// Group of the affected entry.
    pub fn group(&self) -> &str {
        match self {
            Self::Changed(change) => &change.group,
            Self::FetchFailed(failure) => &failure.group,
        }
    }
}

impl From<ChangeNotification> for ChangeEvent {
    fn from(change: ChangeNotification) -> Self {
        Self::Changed(change)
    }
}

impl From<FetchFailure> for ChangeEvent {
    fn from(failure: FetchFailure) -> Self {
        Self::FetchFailed(failure)
    }
}

/// Callback invoked for every subscription event.
///
/// Clients may invoke it from any task and concurrently for different entries.
pub type ChangeListener = Arc<dyn Fn(ChangeEvent) + Send + Sync>;

/// Pull and push-on-change access to a remote configuration service.
///
/// Implement this trait to plug in a different configuration backend.
#[async_trait]
pub trait RemoteConfigClient: Send + Sync {
    /// Fetch the current content of an entry.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::FetchError` if the service is unreachable or the
    /// entry does not exist.
    async fn fetch(&self, remote_id: &str, group: &str) -> Result<String>;

    /// Register `listener` for changes to an entry.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::SubscribeError` if the subscription cannot be set up.
    async fn subscribe(
        &self,
        remote_id: &str,
        group: &str,
        listener: ChangeListener,
    ) -> Result<()>;

    /// Namespace this client operates in.
    fn namespace(&self) -> &str;

    /// Get a human-readable name for this client (for logging/debugging).
    fn name(&self) -> String;
}
