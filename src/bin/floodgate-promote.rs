//! # Floodgate Promote CLI
//!
//! Operator tool for the promotion pipeline: validate configuration, run a job
//! end to end with in-process dispatch, or print a job's status summary.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use floodgate_core::config::{ConfigManager, DispatchBackend};
use floodgate_core::logging::init_structured_logging;
use floodgate_core::orchestration::{JobParams, PromotionSystem};
use floodgate_core::status::StatusTracker;
use std::path::PathBuf;
use std::process;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "floodgate-promote")]
#[command(about = "Promote a floodgated content tree to the primary tree")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Configuration directory (default: $FLOODGATE_CONFIG_DIR or ./config)
    #[arg(short, long, global = true)]
    config_dir: Option<PathBuf>,

    /// Environment name (default: $FLOODGATE_ENV or development)
    #[arg(short, long, global = true)]
    env: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load and validate configuration, then print the effective settings
    ValidateConfig,

    /// Start a promotion job and, with local dispatch, wait for it to finish
    Run {
        /// Staging root folder to promote
        #[arg(long)]
        root_folder: String,

        /// Admin page URI used to scope authorization
        #[arg(long)]
        admin_page_uri: String,

        /// Project reference path
        #[arg(long)]
        project_path: String,

        /// Request publishing after promotion
        #[arg(long)]
        publish: bool,
    },

    /// Print the job record, batch records and failed paths of a job
    Status {
        /// Staging root folder of the job
        #[arg(long)]
        root_folder: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match load_config(&cli) {
        Ok(manager) => {
            init_structured_logging(&manager.config().logging);
            match cli.command {
                Commands::ValidateConfig => validate_config(&manager),
                Commands::Run {
                    root_folder,
                    admin_page_uri,
                    project_path,
                    publish,
                } => {
                    let params = JobParams::new(root_folder, admin_page_uri, project_path)
                        .with_publish(publish);
                    run_job(manager, params).await
                }
                Commands::Status { root_folder } => show_status(&manager, &root_folder).await,
            }
        }
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        error!(error = %e, "floodgate-promote failed");
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<ConfigManager> {
    let environment = cli
        .env
        .clone()
        .unwrap_or_else(ConfigManager::detect_environment);
    ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), &environment)
        .context("failed to load configuration")
}

fn validate_config(manager: &ConfigManager) -> anyhow::Result<()> {
    println!("Configuration is valid");
    println!("Environment: {}", manager.environment());
    println!("Config Directory: {}", manager.config_directory().display());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&manager.debug_config())
            .context("failed to render configuration")?
    );
    Ok(())
}

async fn run_job(manager: ConfigManager, params: JobParams) -> anyhow::Result<()> {
    let root_folder = params.root_folder.clone();
    let system = PromotionSystem::bootstrap(manager).await?;

    let response = system.start_job(params).await;
    info!(root_folder = %root_folder, response = ?response, "Promotion job started");
    if !response.is_success() {
        bail!("promotion job was not started: {response:?}");
    }

    if system.context().config.dispatch.backend == DispatchBackend::Openwhisk {
        println!("Job dispatched to OpenWhisk; use `status --root-folder {root_folder}` to follow it");
        return Ok(());
    }

    let responses = system.wait_for_idle().await;
    info!(stages = responses.len(), "All in-process stages finished");

    let summary = system.summarize(&root_folder).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    system.shutdown();
    Ok(())
}

async fn show_status(manager: &ConfigManager, root_folder: &str) -> anyhow::Result<()> {
    let (status_store, batch_store) = PromotionSystem::open_stores(manager).await?;
    let summary =
        StatusTracker::summarize(status_store.as_ref(), batch_store.as_ref(), root_folder).await?;
    if summary.job.is_empty() {
        bail!("no promotion job recorded for {root_folder}");
    }
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
