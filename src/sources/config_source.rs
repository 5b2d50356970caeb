//! Configuration source trait.

use super::SyncSettings;
use crate::core::Validate;
use crate::error::Result;

/// Where the settings of a run come from.
///
/// The orchestrator only ever sees the resulting [`SyncSettings`], so inline
/// CLI arguments and a structured file drive exactly the same startup path.
pub trait ConfigurationSource: Send + Sync {
    /// Load settings from this source.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be read or parsed.
    fn load(&self) -> Result<SyncSettings>;

    /// Get a human-readable name for this source (for logging/debugging).
    fn name(&self) -> String;

    /// Load settings and check them for missing or inconsistent values.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::ValidationError` listing every problem found.
    fn load_validated(&self) -> Result<SyncSettings> {
        let settings = self.load()?;
        settings.validate()?;
        Ok(settings)
    }
}
