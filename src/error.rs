//! Error types for proxy-config-sync.

use std::fmt;
use std::path::PathBuf;

/// Result type alias for proxy-config-sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that can occur while synchronizing configuration files.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The watched-entry specification is malformed.
    #[error("Malformed entry specification: {0}")]
    ParseError(String),

    /// Content could not be fetched from the remote configuration service.
    #[error("Failed to fetch '{remote_id}' (group '{group}'): {reason}")]
    FetchError {
        /// Remote identifier of the entry
        remote_id: String,
        /// Group the entry belongs to
        group: String,
        /// What went wrong
        reason: String,
    },

    /// A change subscription could not be registered.
    #[error("Failed to subscribe to '{remote_id}' (group '{group}'): {reason}")]
    SubscribeError {
        /// Remote identifier of the entry
        remote_id: String,
        /// Group the entry belongs to
        group: String,
        /// What went wrong
        reason: String,
    },

    /// Writing a local file failed.
    #[error("Failed to write {}: {source}", path.display())]
    IoError {
        /// The file that could not be written
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Failed to load settings from a configuration source.
    #[error("Failed to load settings: {0}")]
    LoadError(String),

    /// Failed to deserialize settings.
    #[error("Failed to deserialize settings: {0}")]
    DeserializationError(String),

    /// Settings validation failed.
    #[error("Settings validation failed: {0}")]
    ValidationError(String),

    /// The remote client could not be constructed.
    #[error("Remote client error: {0}")]
    ClientError(String),

    /// The entry registry was published more than once.
    #[error("Entry registry has already been published")]
    AlreadyPublished,

    /// An operator alert could not be delivered.
    #[error("Alert delivery failed: {0}")]
    AlertError(String),

    /// Generic error for other cases.
    #[error("Sync error: {0}")]
    Other(String),
}

impl SyncError {
    pub(crate) fn fetch(remote_id: &str, group: &str, reason: impl Into<String>) -> Self {
        Self::FetchError {
            remote_id: remote_id.to_string(),
            group: group.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn subscribe(remote_id: &str, group: &str, reason: impl Into<String>) -> Self {
        Self::SubscribeError {
            remote_id: remote_id.to_string(),
            group: group.to_string(),
            reason: reason.into(),
        }
    }
}

/// Validation error for settings validation.
#[derive(Debug)]
pub enum ValidationError {
    /// Custom validation error with a message.
    Custom(String),

    /// A specific field has an invalid value.
    InvalidField {
        /// The field name/path
        field: String,
        /// The reason why it's invalid
        reason: String,
    },

    /// Multiple validation errors occurred.
    Multiple(Vec<ValidationError>),
}

impl ValidationError {
    /// Create a custom validation error.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// Create an invalid field error.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Collapse a list of problems into a single error, or `Ok` if there are none.
    pub fn from_problems(mut problems: Vec<ValidationError>) -> std::result::Result<(), Self> {
        match problems.len() {
            0 => Ok(()),
            1 => Err(problems.remove(0)),
            _ => Err(Self::Multiple(problems)),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom(msg) => write!(f, "{}", msg),
            Self::InvalidField { field, reason } => {
                write!(f, "Field '{}' is invalid: {}", field, reason)
            }
            Self::Multiple(errors) => {
                writeln!(f, "Multiple validation errors:")?;
                for (i, err) in errors.iter().enumerate() {
                    writeln!(f, "  {}. {}", i + 1, err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for SyncError {
    fn from(err: ValidationError) -> Self {
        SyncError::ValidationError(err.to_string())
    }
}
