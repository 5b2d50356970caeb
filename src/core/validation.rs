//! Settings validation support.

use crate::error::ValidationError;

/// Trait for settings validation.
///
/// Implemented by settings types so that configuration sources can reject
/// unusable values before any remote interaction happens.
///
/// # Examples
///
/// ```rust
/// use proxy_config_sync::core::Validate;
/// use proxy_config_sync::error::ValidationError;
///
/// struct Endpoint {
///     address: String,
///     port: u16,
/// }
///
/// impl Validate for Endpoint {
///     fn validate(&self) -> Result<(), ValidationError> {
///         let mut problems = Vec::new();
///         if self.address.is_empty() {
///             problems.push(ValidationError::invalid_field("address", "must not be empty"));
///         }
///         if self.port == 0 {
///             problems.push(ValidationError::invalid_field("port", "must be greater than 0"));
///         }
///         ValidationError::from_problems(problems)
///     }
/// }
///
/// let endpoint = Endpoint { address: String::new(), port: 0 };
/// assert!(matches!(endpoint.validate(), Err(ValidationError::Multiple(_))));
/// ```
pub trait Validate {
    /// Validate the settings.
    ///
    /// # Errors
    ///
    /// Should return a `ValidationError` describing every problem found.
    fn validate(&self) -> Result<(), ValidationError>;
}
