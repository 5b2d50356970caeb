//! Settings assembled from command-line arguments.

use super::{AlertSettings, ConfigurationSource, ReloadSettings, ServerSettings, SyncSettings};
use crate::core::WatchedEntrySet;
use crate::error::Result;

/// Settings source backed by inline command-line values.
///
/// Entries are given as one delimited string,
/// `dataId*group*file#dataId*group*file`.
///
/// # Examples
///
/// ```rust
/// use proxy_config_sync::sources::{ArgsSource, ConfigurationSource};
///
/// let source = ArgsSource::new("10.0.0.5", 8848, "prod", "app*DEFAULT*/etc/nginx/conf.d/app.conf")
///     .with_alert(Some("https://hooks.example.com/send".to_string()));
/// let settings = source.load().unwrap();
/// assert_eq!(settings.files.len(), 1);
/// assert!(settings.alert.enabled);
/// ```
#[derive(Debug, Clone)]
pub struct ArgsSource {
    address: String,
    port: u16,
    namespace: String,
    files: String,
    alert_url: Option<String>,
    alert_enabled: bool,
    reload: ReloadSettings,
}

impl ArgsSource {
    /// Create a source from the mandatory arguments.
    pub fn new(
        address: impl Into<String>,
        port: u16,
        namespace: impl Into<String>,
        files: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            port,
            namespace: namespace.into(),
            files: files.into(),
            alert_url: None,
            alert_enabled: false,
            reload: ReloadSettings::default(),
        }
    }

    /// Enable alerting, delivering to `url`.
    ///
    /// Enabling alerts without a URL is rejected at validation time.
    pub fn with_alert(mut self, url: Option<String>) -> Self {
        self.alert_enabled = true;
        self.alert_url = url;
        self
    }

    /// Override the reload commands.
    pub fn with_reload(mut self, reload: ReloadSettings) -> Self {
        self.reload = reload;
        self
    }
}

impl ConfigurationSource for ArgsSource {
    fn load(&self) -> Result<SyncSettings> {
        let entries = WatchedEntrySet::parse(&self.files)?;

        Ok(SyncSettings {
            server: ServerSettings::new(self.address.clone(), self.port, self.namespace.clone()),
            files: entries.as_slice().to_vec(),
            alert: AlertSettings {
                enabled: self.alert_enabled,
                url: self.alert_url.clone(),
                host_label: None,
            },
            reload: self.reload.clone(),
        })
    }

    fn name(&self) -> String {
        "args".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;

    #[test]
    fn test_load() {
        let source = ArgsSource::new("127.0.0.1", 8848, "prod", "a*G*/tmp/a#b*G*/tmp/b");
        let settings = source.load().unwrap();

        assert_eq!(settings.server.address, "127.0.0.1");
        assert_eq!(settings.server.port, 8848);
        assert_eq!(settings.server.namespace, "prod");
        assert_eq!(settings.files.len(), 2);
        assert!(!settings.alert.enabled);
    }

    #[test]
    fn test_malformed_files() {
        let source = ArgsSource::new("127.0.0.1", 8848, "prod", "a*G");
        assert!(matches!(source.load(), Err(SyncError::ParseError(_))));
    }

    #[test]
    fn test_missing_port_fails_validation() {
        let source = ArgsSource::new("127.0.0.1", 0, "prod", "a*G*/tmp/a");
        assert!(source.load().is_ok());
        assert!(matches!(
            source.load_validated(),
            Err(SyncError::ValidationError(_))
        ));
    }

    #[test]
    fn test_alert_without_url_fails_validation() {
        let source = ArgsSource::new("127.0.0.1", 8848, "prod", "a*G*/tmp/a").with_alert(None);
        assert!(source.load_validated().is_err());
    }

    #[test]
    fn test_name() {
        assert_eq!(ArgsSource::new("h", 1, "n", "a*b*c").name(), "args");
    }
}
