//! Addressable configuration keys (`section.key`).

use std::path::PathBuf;
use std::str::FromStr;

use super::file::{ConfigError, ConfigFile};

/// A single configuration setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    RegistryUrl,
    RegistryTimeout,
    MirrorDirectory,
    MirrorConcurrency,
    MirrorRetryConcurrency,
    MirrorAllMajors,
    LoggingDirectory,
    LoggingLevel,
}

const ALL_KEYS: [ConfigKey; 8] = [
    ConfigKey::RegistryUrl,
    ConfigKey::RegistryTimeout,
    ConfigKey::MirrorDirectory,
    ConfigKey::MirrorConcurrency,
    ConfigKey::MirrorRetryConcurrency,
    ConfigKey::MirrorAllMajors,
    ConfigKey::LoggingDirectory,
    ConfigKey::LoggingLevel,
];

impl ConfigKey {
    /// Every key, in file order.
    pub fn all() -> &'static [ConfigKey] {
        &ALL_KEYS
    }

    /// INI section holding this key.
    pub fn section(&self) -> &'static str {
        match self {
            ConfigKey::RegistryUrl | ConfigKey::RegistryTimeout => "registry",
            ConfigKey::MirrorDirectory
            | ConfigKey::MirrorConcurrency
            | ConfigKey::MirrorRetryConcurrency
            | ConfigKey::MirrorAllMajors => "mirror",
            ConfigKey::LoggingDirectory | ConfigKey::LoggingLevel => "logging",
        }
    }

    /// Key name within its section.
    pub fn key_name(&self) -> &'static str {
        match self {
            ConfigKey::RegistryUrl => "url",
            ConfigKey::RegistryTimeout => "timeout",
            ConfigKey::MirrorDirectory => "directory",
            ConfigKey::MirrorConcurrency => "concurrency",
            ConfigKey::MirrorRetryConcurrency => "retry_concurrency",
            ConfigKey::MirrorAllMajors => "all_majors",
            ConfigKey::LoggingDirectory => "directory",
            ConfigKey::LoggingLevel => "level",
        }
    }

    /// Fully qualified name, `section.key`.
    pub fn name(&self) -> String {
        format!("{}.{}", self.section(), self.key_name())
    }

    /// Current value rendered as a string.
    pub fn get(&self, config: &ConfigFile) -> String {
        match self {
            ConfigKey::RegistryUrl => config.registry.url.clone(),
            ConfigKey::RegistryTimeout => config.registry.timeout_secs.to_string(),
            ConfigKey::MirrorDirectory => config.mirror.directory.display().to_string(),
            ConfigKey::MirrorConcurrency => config.mirror.concurrency.to_string(),
            ConfigKey::MirrorRetryConcurrency => config.mirror.retry_concurrency.to_string(),
            ConfigKey::MirrorAllMajors => config.mirror.all_majors.to_string(),
            ConfigKey::LoggingDirectory => config.logging.directory.display().to_string(),
            ConfigKey::LoggingLevel => config.logging.level.clone(),
        }
    }

    /// Parse and store a value.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigError> {
        let value = value.trim();
        match self {
            ConfigKey::RegistryUrl => config.registry.url = value.to_string(),
            ConfigKey::RegistryTimeout => config.registry.timeout_secs = self.parse(value)?,
            ConfigKey::MirrorDirectory => config.mirror.directory = PathBuf::from(value),
            ConfigKey::MirrorConcurrency => config.mirror.concurrency = self.positive(value)?,
            ConfigKey::MirrorRetryConcurrency => {
                config.mirror.retry_concurrency = self.positive(value)?
            }
            ConfigKey::MirrorAllMajors => config.mirror.all_majors = self.parse(value)?,
            ConfigKey::LoggingDirectory => config.logging.directory = PathBuf::from(value),
            ConfigKey::LoggingLevel => config.logging.level = value.to_string(),
        }
        Ok(())
    }

    fn parse<T: FromStr>(&self, value: &str) -> Result<T, ConfigError> {
        value.parse().map_err(|_| self.invalid(value))
    }

    fn positive(&self, value: &str) -> Result<usize, ConfigError> {
        match self.parse::<usize>(value)? {
            0 => Err(self.invalid(value)),
            n => Ok(n),
        }
    }

    fn invalid(&self, value: &str) -> ConfigError {
        ConfigError::InvalidValue {
            key: self.name(),
            value: value.to_string(),
        }
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_KEYS
            .iter()
            .copied()
            .find(|key| key.name() == s)
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}
