//! Configuration management CLI commands.
//!
//! `config get`, `config set`, `config list` and `config path` read and edit
//! the INI file without opening it by hand.

use clap::Subcommand;
use console::style;
use pkgmirror::config::{config_file_path, ConfigFile, ConfigKey};

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print one setting
    Get {
        /// Setting in section.key form (e.g. mirror.concurrency)
        key: String,
    },

    /// Change one setting and save the file
    Set {
        /// Setting in section.key form (e.g. registry.url)
        key: String,

        /// New value
        value: String,
    },

    /// Print every setting
    List,

    /// Print the configuration file path
    Path,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Get { key } => {
            let key = parse_key(&key)?;
            println!("{}", display_value(&key.get(&load()?)));
            Ok(())
        }
        ConfigCommands::Set { key, value } => {
            let key = parse_key(&key)?;
            let mut config = load()?;
            key.set(&mut config, &value)?;
            config.save()?;
            println!("{} = {}", key.name(), key.get(&config));
            Ok(())
        }
        ConfigCommands::List => {
            list(&load()?);
            Ok(())
        }
        ConfigCommands::Path => {
            println!("{}", config_file_path().display());
            Ok(())
        }
    }
}

/// Unlike other commands, a file that cannot be parsed is an error here so
/// `set` never overwrites settings it failed to read.
fn load() -> Result<ConfigFile, CliError> {
    Ok(ConfigFile::load()?)
}

fn parse_key(key: &str) -> Result<ConfigKey, CliError> {
    key.parse().map_err(|_| {
        CliError::Config(format!(
            "Unknown configuration key '{}'. Run 'pkgmirror config list' to see available keys.",
            key
        ))
    })
}

fn display_value(value: &str) -> &str {
    if value.is_empty() {
        "(not set)"
    } else {
        value
    }
}

fn list(config: &ConfigFile) {
    println!("{}", style(config_file_path().display()).dim());

    let mut section = "";
    for key in ConfigKey::all() {
        if key.section() != section {
            section = key.section();
            println!();
            println!("[{}]", style(section).bold());
        }
        println!("  {} = {}", key.key_name(), display_value(&key.get(config)));
    }
}
