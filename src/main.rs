use anyhow::{anyhow, Context, Result};
use pipewright::cli::commands::{
    DefaultsCommand, ExportCommand, ImportCommand, SyncCommand, ValidateCommand,
};
use pipewright::cli::output::*;
use pipewright::cli::{Cli, Command};
use pipewright::core::PipelineRecord;
use pipewright::reconcile;
use pipewright::schema::{self, ConfigStore};
use pipewright::{EditSession, HttpConfigApi, PipelineDefinition, StageType, TaskType};
use std::str::FromStr;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    match &cli.command {
        Command::Validate(cmd) => validate_definition(cmd)?,
        Command::Defaults(cmd) => show_defaults(cmd)?,
        Command::Export(cmd) => export_record(cmd)?,
        Command::Import(cmd) => import_record(cmd)?,
        Command::Sync(cmd) => sync_definition(cmd).await?,
    }

    Ok(())
}

fn load_definition(path: &str) -> Result<(PipelineDefinition, pipewright::Pipeline, ConfigStore)> {
    let definition =
        PipelineDefinition::from_file(path).context("Failed to load pipeline definition")?;
    let mut store = ConfigStore::new();
    let pipeline = definition
        .to_pipeline(&mut store)
        .map_err(|e| anyhow!("Invalid pipeline definition: {e}"))?;
    Ok((definition, pipeline, store))
}

fn validate_definition(cmd: &ValidateCommand) -> Result<()> {
    let (_, pipeline, _) = load_definition(&cmd.file)?;
    pipeline
        .validate()
        .map_err(|e| anyhow!("Validation failed: {e}"))?;

    println!(
        "{} {} is valid ({} task(s))",
        CHECK,
        style(&cmd.file).bold(),
        pipeline.registry.len()
    );
    print_registry(&pipeline.registry);
    Ok(())
}

fn show_defaults(cmd: &DefaultsCommand) -> Result<()> {
    let task_type = TaskType::from_str(&cmd.task_type).map_err(|e| anyhow!(e))?;
    let stage_type = StageType::from_str(&cmd.stage_type).map_err(|e| anyhow!(e))?;

    let local = schema::default_config(task_type, stage_type);
    if local.is_empty() {
        println!(
            "{} no config schema for {}/{}",
            INFO, task_type, stage_type
        );
        return Ok(());
    }

    let config = if cmd.wire {
        schema::to_wire(task_type, stage_type, &local)
            .ok_or_else(|| anyhow!("no wire mapping for {}/{}", task_type, stage_type))?
    } else {
        local
    };
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn export_record(cmd: &ExportCommand) -> Result<()> {
    let (_, pipeline, store) = load_definition(&cmd.file)?;
    let record = pipeline.to_record(&store);
    let json = if cmd.pretty {
        serde_json::to_string_pretty(&record)?
    } else {
        serde_json::to_string(&record)?
    };
    println!("{json}");
    Ok(())
}

fn import_record(cmd: &ImportCommand) -> Result<()> {
    let content = std::fs::read_to_string(&cmd.file)
        .with_context(|| format!("Failed to read {}", cmd.file))?;
    let record: PipelineRecord =
        serde_json::from_str(&content).context("Failed to parse pipeline record")?;

    let mut store = ConfigStore::new();
    let pipeline = reconcile::reconcile(&record, &mut store);

    println!(
        "{} reconciled pipeline for project {} ({} task(s))",
        CHECK,
        style(&pipeline.project_id).bold(),
        pipeline.registry.len()
    );
    print_registry(&pipeline.registry);
    Ok(())
}

async fn sync_definition(cmd: &SyncCommand) -> Result<()> {
    let definition =
        PipelineDefinition::from_file(&cmd.file).context("Failed to load pipeline definition")?;
    let api = Arc::new(HttpConfigApi::new(cmd.api_url.as_str()));

    let mut session = EditSession::from_definition(api, &definition)
        .map_err(|e| anyhow!("Invalid pipeline definition: {e}"))?;
    session.pipeline.id = cmd.pipeline_id;

    println!(
        "{} syncing {} to {}",
        ROCKET,
        style(&cmd.file).bold(),
        style(&cmd.api_url).dim()
    );

    let report = session
        .submit()
        .await
        .map_err(|e| anyhow!("Sync failed: {e}"))?;

    println!(
        "{} pipeline {} saved: {}",
        CHECK,
        report.pipeline_id,
        format_flush_report(&report.flush)
    );
    print_failures(&report.flush);
    if !report.flush.is_success() {
        println!(
            "{} some stage configs are still local-only; run sync again to retry",
            WARN
        );
    }
    Ok(())
}
