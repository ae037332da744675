//! INI configuration file.
//!
//! Lives at `<config dir>/pkgmirror/config.ini`:
//!
//! ```ini
//! [registry]
//! url = https://registry.npmjs.org
//! timeout = 60
//!
//! [mirror]
//! directory = ./mirror
//! concurrency = 30
//! retry_concurrency = 10
//! all_majors = true
//!
//! [logging]
//! directory = ~/.local/share/pkgmirror/logs
//! level = info
//! ```

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use ini::Ini;

use super::keys::ConfigKey;
use crate::registry::{DEFAULT_REGISTRY_URL, DEFAULT_TIMEOUT_SECS};

/// Default main-pass concurrency.
pub const DEFAULT_CONCURRENCY: usize = 30;

/// Default retry-round concurrency.
pub const DEFAULT_RETRY_CONCURRENCY: usize = 10;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Errors that can occur while loading or saving configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// The file could not be read or parsed.
    Read { path: PathBuf, reason: String },

    /// The file could not be written.
    Write { path: PathBuf, source: io::Error },

    /// A key holds a value of the wrong type.
    InvalidValue { key: String, value: String },

    /// A key name is not recognised.
    UnknownKey(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, reason } => {
                write!(f, "Failed to read config {}: {}", path.display(), reason)
            }
            ConfigError::Write { path, source } => {
                write!(f, "Failed to write config {}: {}", path.display(), source)
            }
            ConfigError::InvalidValue { key, value } => {
                write!(f, "Invalid value '{}' for {}", value, key)
            }
            ConfigError::UnknownKey(key) => write!(f, "Unknown configuration key '{}'", key),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Write { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// `[registry]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrySettings {
    /// Registry base URL.
    pub url: String,
    /// HTTP timeout in seconds.
    pub timeout_secs: u64,
}

/// `[mirror]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorSettings {
    /// Mirror root directory.
    pub directory: PathBuf,
    /// Main-pass concurrency.
    pub concurrency: usize,
    /// Retry-round concurrency.
    pub retry_concurrency: usize,
    /// Whether to mirror the newest release of every major line.
    pub all_majors: bool,
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Directory for daily log files.
    pub directory: PathBuf,
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
}

/// Parsed configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    pub registry: RegistrySettings,
    pub mirror: MirrorSettings,
    pub logging: LoggingSettings,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            registry: RegistrySettings {
                url: DEFAULT_REGISTRY_URL.to_string(),
                timeout_secs: DEFAULT_TIMEOUT_SECS,
            },
            mirror: MirrorSettings {
                directory: PathBuf::from("mirror"),
                concurrency: DEFAULT_CONCURRENCY,
                retry_concurrency: DEFAULT_RETRY_CONCURRENCY,
                all_majors: true,
            },
            logging: LoggingSettings {
                directory: default_log_dir(),
                level: DEFAULT_LOG_LEVEL.to_string(),
            },
        }
    }
}

impl ConfigFile {
    /// Load from the default location. A missing file yields defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    /// Load from a specific file. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut config = Self::default();
        for key in ConfigKey::all() {
            let value = ini
                .section(Some(key.section()))
                .and_then(|section| section.get(key.key_name()));
            if let Some(value) = value {
                key.set(&mut config, value)?;
            }
        }
        Ok(config)
    }

    /// Save to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path())
    }

    /// Save to a specific file, creating its directory.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let mut ini = Ini::new();
        for key in ConfigKey::all() {
            ini.with_section(Some(key.section()))
                .set(key.key_name(), key.get(self));
        }
        ini.write_to_file(path).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Default configuration file path.
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pkgmirror")
        .join("config.ini")
}

/// Default log directory.
pub fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pkgmirror")
        .join("logs")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let config = ConfigFile::load_from(&temp.path().join("none.ini")).unwrap();
        assert_eq!(config, ConfigFile::default());
        assert_eq!(config.mirror.concurrency, 30);
        assert_eq!(config.mirror.retry_concurrency, 10);
    }

    #[test]
    fn test_partial_file_overrides_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.ini");
        std::fs::write(
            &path,
            "[registry]\nurl = https://mirror.local\n\n[mirror]\nconcurrency = 8\nall_majors = false\n",
        )
        .unwrap();

        let config = ConfigFile::load_from(&path).unwrap();
        assert_eq!(config.registry.url, "https://mirror.local");
        assert_eq!(config.registry.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(config.mirror.concurrency, 8);
        assert!(!config.mirror.all_majors);
    }

    #[test]
    fn test_invalid_value_is_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.ini");
        std::fs::write(&path, "[mirror]\nconcurrency = lots\n").unwrap();

        let err = ConfigFile::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
        assert!(err.to_string().contains("mirror.concurrency"));
    }

    #[test]
    fn test_save_and_reload() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.ini");

        let mut config = ConfigFile::default();
        config.mirror.directory = PathBuf::from("/srv/npm");
        config.logging.level = "debug".to_string();
        config.save_to(&path).unwrap();

        assert_eq!(ConfigFile::load_from(&path).unwrap(), config);
    }
}
