//! pkgmirror CLI - command-line interface
//!
//! Mirrors the archives referenced by an npm lock document into a local
//! directory tree that offline installs can read from.

mod commands;
mod error;
mod runner;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use console::style;

use commands::audit::AuditArgs;
use commands::common::RunOptions;
use commands::config::ConfigCommands;
use error::CliError;
use runner::CliRunner;

#[derive(Debug, Parser)]
#[command(name = "pkgmirror", version, about, long_about = None)]
struct Cli {
    /// Echo warnings and errors to stderr as well as the log file
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Mirror every package in a lock file
    Mirror {
        /// Lock file (package-lock.json or npm-shrinkwrap.json)
        #[arg(short, long, default_value = "package-lock.json")]
        lock: PathBuf,

        #[command(flatten)]
        options: RunOptions,
    },

    /// Mirror one package by name
    Package {
        /// Package name, e.g. lodash or @types/node
        name: String,

        /// Exact version (defaults to the latest dist-tag)
        #[arg(long)]
        version: Option<String>,

        #[command(flatten)]
        options: RunOptions,
    },

    /// Check the mirror tree for missing or damaged files
    Audit {
        /// Download missing versions for packages with version gaps
        #[arg(long)]
        fix: bool,

        /// Skip decompressing archives
        #[arg(long)]
        no_verify: bool,

        #[command(flatten)]
        options: RunOptions,
    },

    /// View or change configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("error:").red().bold(), e);
            e.exit_code()
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Config { command } => commands::config::run(command),
        Commands::Mirror { lock, options } => {
            let runner = CliRunner::new(cli.verbose)?;
            commands::mirror::run(&runner, lock, &options)
        }
        Commands::Package {
            name,
            version,
            options,
        } => {
            let runner = CliRunner::new(cli.verbose)?;
            commands::package::run(&runner, &name, version.as_deref(), &options)
        }
        Commands::Audit {
            fix,
            no_verify,
            options,
        } => {
            let runner = CliRunner::new(cli.verbose)?;
            commands::audit::run(
                &runner,
                AuditArgs {
                    fix,
                    verify: !no_verify,
                    options,
                },
            )
        }
    }
}
