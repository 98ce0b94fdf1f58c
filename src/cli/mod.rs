//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{DefaultsCommand, ExportCommand, ImportCommand, SyncCommand, ValidateCommand};

/// Pipeline definition editor and synchronization tool
#[derive(Debug, Parser, Clone)]
#[command(name = "pipewright")]
#[command(author = "Pipewright Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Edit, validate and synchronize CI/CD pipeline definitions", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Validate a pipeline definition file
    Validate(ValidateCommand),

    /// Show the default config for a (task type, stage type) pair
    Defaults(DefaultsCommand),

    /// Render a definition as its persistence record
    Export(ExportCommand),

    /// Rebuild a pipeline from a persisted record
    Import(ImportCommand),

    /// Save a definition to the remote store and flush stage configs
    Sync(SyncCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}

use std::ffi::OsString;
