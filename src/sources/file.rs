//! File-based settings source.

use super::{ConfigurationSource, SyncSettings};
use crate::error::{Result, SyncError};
use config::{Environment, File};
use std::path::PathBuf;

/// Settings source backed by a YAML, TOML, or JSON file.
///
/// The format is detected from the file extension. Environment variables
/// can optionally override individual values, e.g.
/// `PROXY_SYNC_SERVER__ADDRESS=10.0.0.6` with prefix `PROXY_SYNC` and
/// separator `__`.
///
/// # Examples
///
/// ```rust,no_run
/// use proxy_config_sync::sources::{ConfigurationSource, FileSource};
///
/// let source = FileSource::new("/etc/proxy-config-sync/sync.yaml")
///     .with_env_overrides("PROXY_SYNC", "__");
/// let settings = source.load_validated().unwrap();
/// ```
pub struct FileSource {
    path: PathBuf,
    env_prefix: Option<String>,
    env_separator: String,
}

impl FileSource {
    /// Create a new file source with automatic format detection.
    ///
    /// The format is detected from the file extension:
    /// - `.yaml`, `.yml` -> YAML
    /// - `.toml` -> TOML
    /// - `.json` -> JSON
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            env_prefix: None,
            env_separator: "__".to_string(),
        }
    }

    /// Let environment variables with `prefix` override file values.
    ///
    /// # Arguments
    ///
    /// * `prefix` - Prefix for environment variables (e.g., "PROXY_SYNC")
    /// * `separator` - Separator for nested keys (e.g., "__" for PROXY_SYNC_ALERT__URL)
    pub fn with_env_overrides(mut self, prefix: &str, separator: &str) -> Self {
        self.env_prefix = Some(prefix.to_string());
        self.env_separator = separator.to_string();
        self
    }

    /// Validate that the file extension is supported.
    fn validate_extension(&self) -> Result<()> {
        let extension = self
            .path
            .extension()
            .and_then(|ext| ext.to_str())
            .ok_or_else(|| {
                SyncError::LoadError(format!(
                    "Unable to determine file format for: {}",
                    self.path.display()
                ))
            })?;

        match extension {
            "yaml" | "yml" | "toml" | "json" => Ok(()),
            _ => Err(SyncError::LoadError(format!(
                "Unsupported file extension: {}. Supported: .yaml, .yml, .toml, .json",
                extension
            ))),
        }
    }
}

impl ConfigurationSource for FileSource {
    fn load(&self) -> Result<SyncSettings> {
        self.validate_extension()?;

        if !self.path.exists() {
            return Err(SyncError::LoadError(format!(
                "Configuration file not found: {}",
                self.path.display()
            )));
        }

        let mut builder =
            config::Config::builder().add_source(File::from(self.path.clone()).required(true));

        if let Some(prefix) = &self.env_prefix {
            builder = builder.add_source(
                Environment::with_prefix(prefix)
                    .prefix_separator("_")
                    .separator(&self.env_separator)
                    .try_parsing(true),
            );
        }

        let config = builder
            .build()
            .map_err(|e| SyncError::LoadError(format!("Failed to load file: {}", e)))?;

        config.try_deserialize::<SyncSettings>().map_err(|e| {
            SyncError::DeserializationError(format!("Failed to parse file: {}", e))
        })
    }

    fn name(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_validate_extension_yaml() {
        assert!(FileSource::new("sync.yaml").validate_extension().is_ok());
        assert!(FileSource::new("sync.yml").validate_extension().is_ok());
    }

    #[test]
    fn test_validate_extension_toml_and_json() {
        assert!(FileSource::new("sync.toml").validate_extension().is_ok());
        assert!(FileSource::new("sync.json").validate_extension().is_ok());
    }

    #[test]
    fn test_validate_extension_unknown() {
        assert!(FileSource::new("sync.txt").validate_extension().is_err());
        assert!(FileSource::new("sync").validate_extension().is_err());
    }

    #[test]
    fn test_load_yaml_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sync.yaml");

        fs::write(
            &path,
            r#"
server:
  address: 10.0.0.5
  port: 8848
  namespace: prod
files:
  - dataId: app.conf
    group: DEFAULT_GROUP
    file: /etc/nginx/conf.d/app.conf
alert:
  enabled: true
  url: https://hooks.example.com/send
"#,
        )
        .unwrap();

        let settings = FileSource::new(&path).load_validated().unwrap();
        assert_eq!(settings.server.port, 8848);
        assert_eq!(settings.server.context_path, "/nacos");
        assert_eq!(settings.files[0].remote_id, "app.conf");
        assert!(settings.alert.enabled);
        assert_eq!(settings.reload.test_command, "nginx -t");
    }

    #[test]
    fn test_load_nonexistent_file() {
        let source = FileSource::new("/nonexistent/sync.yaml");
        assert!(matches!(source.load(), Err(SyncError::LoadError(_))));
    }

    #[test]
    fn test_load_missing_server_section() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sync.json");
        fs::write(&path, r#"{"files": []}"#).unwrap();

        assert!(matches!(
            FileSource::new(&path).load(),
            Err(SyncError::DeserializationError(_))
        ));
    }

    #[test]
    fn test_name() {
        let source = FileSource::new("sync.yaml");
        assert!(source.name().contains("sync.yaml"));
    }
}
