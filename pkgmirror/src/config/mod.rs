//! Configuration file handling.
//!
//! [`ConfigFile`] is the persisted INI file. Every setting is addressable as
//! a [`ConfigKey`] (`section.key`), which the CLI uses for `config get/set`.
//! Runtime options for a mirror run live in
//! [`MirrorConfig`](crate::mirror::MirrorConfig).

mod file;
mod keys;

pub use file::{
    config_file_path, default_log_dir, ConfigError, ConfigFile, LoggingSettings, MirrorSettings,
    RegistrySettings, DEFAULT_CONCURRENCY, DEFAULT_LOG_LEVEL, DEFAULT_RETRY_CONCURRENCY,
};
pub use keys::ConfigKey;
