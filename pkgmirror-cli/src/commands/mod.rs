//! CLI subcommands.

pub mod audit;
pub mod common;
pub mod config;
pub mod mirror;
pub mod package;
