//! Configuration source implementations.

mod args;
mod config_source;
mod file;
mod settings;

pub use args::ArgsSource;
pub use config_source::ConfigurationSource;
pub use file::FileSource;
pub use settings::{AlertSettings, ReloadSettings, ServerSettings, SyncSettings};
