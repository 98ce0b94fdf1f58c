//! CLI command definitions

use clap::Args;

/// Validate a pipeline definition file
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to pipeline definition YAML file
    #[arg(short, long)]
    pub file: String,
}

/// Show the default config for a (task type, stage type) pair
#[derive(Debug, Args, Clone)]
pub struct DefaultsCommand {
    /// Task type (maven, npm, scan)
    pub task_type: String,

    /// Stage type (compile, build, deploy)
    pub stage_type: String,

    /// Show the wire form instead of the local form
    #[arg(long)]
    pub wire: bool,
}

/// Render a definition as its persistence record
#[derive(Debug, Args, Clone)]
pub struct ExportCommand {
    /// Path to pipeline definition YAML file
    #[arg(short, long)]
    pub file: String,

    /// Pretty-print the record JSON
    #[arg(long)]
    pub pretty: bool,
}

/// Rebuild a pipeline from a persisted record
#[derive(Debug, Args, Clone)]
pub struct ImportCommand {
    /// Path to a JSON file holding the pipeline record
    #[arg(short, long)]
    pub file: String,
}

/// Save a definition to the remote store and flush stage configs
#[derive(Debug, Args, Clone)]
pub struct SyncCommand {
    /// Path to pipeline definition YAML file
    #[arg(short, long)]
    pub file: String,

    /// Base URL of the configuration API
    #[arg(long, default_value = "http://localhost:5000/api")]
    pub api_url: String,

    /// Id of an existing pipeline to update
    #[arg(long)]
    pub pipeline_id: Option<i64>,
}
