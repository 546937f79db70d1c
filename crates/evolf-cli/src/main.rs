mod dataset;
mod predict;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use evolf_common::ClientConfig;
use evolf_predict::DownloadRoute;

#[derive(Parser)]
#[command(name = "evolf", version)]
#[command(about = "EvOlf: GPCR-ligand interaction predictions and dataset browser", long_about = None)]
struct Cli {
    /// Config TOML file (defaults to EVOLF_CONFIG, then ./evolf.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a receptor and its ligands for prediction
    Predict(predict::PredictArgs),

    /// Poll a job until it finishes or expires
    Watch {
        /// Job id, result-page URL or `job-id=...` query
        job: String,

        /// Save the result archive once the job completes
        #[arg(long)]
        download: bool,

        /// Directory for the archive (defaults to download.output_dir)
        #[arg(short, long, value_name = "DIR")]
        out: Option<PathBuf>,
    },

    /// Show a job's current status once
    Status {
        /// Job id, result-page URL or `job-id=...` query
        job: String,
    },

    /// Download the result archive of a finished job
    Download {
        /// Job id, result-page URL or `job-id=...` query
        job: String,

        #[arg(short, long, value_name = "DIR")]
        out: Option<PathBuf>,

        #[arg(long, value_enum, default_value_t = RouteArg::Job)]
        route: RouteArg,
    },

    /// Browse and export the EvOlf dataset
    #[command(subcommand)]
    Dataset(dataset::DatasetCommand),
}

/// Backend route serving result archives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum RouteArg {
    /// GET /predict/job/{id}/?download=output
    Job,
    /// GET /predict/download/{id}/
    Download,
}

impl From<RouteArg> for DownloadRoute {
    fn from(arg: RouteArg) -> Self {
        match arg {
            RouteArg::Job => DownloadRoute::JobQuery,
            RouteArg::Download => DownloadRoute::DownloadEndpoint,
        }
    }
}

fn load_config(explicit: Option<&PathBuf>) -> anyhow::Result<ClientConfig> {
    let path = explicit.cloned().unwrap_or_else(ClientConfig::config_path);
    if path.exists() {
        let config = ClientConfig::load_from(&path)
            .with_context(|| format!("Failed to load {}", path.display()))?;
        info!("Configuration loaded from {}", path.display());
        return Ok(config);
    }
    if explicit.is_some() {
        anyhow::bail!("Config file not found: {}", path.display());
    }
    warn!("No {} found, using defaults", path.display());
    warn!("Copy evolf.example.toml to evolf.toml and edit it.");
    Ok(ClientConfig::defaults_with_env()?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("evolf=debug,info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    info!("API: {}", config.api.base_url);

    match cli.command {
        Commands::Predict(args) => predict::run_predict(&config, args).await,
        Commands::Watch { job, download, out } => predict::run_watch(&config, &job, download, out).await,
        Commands::Status { job } => predict::run_status(&config, &job).await,
        Commands::Download { job, out, route } => predict::run_download(&config, &job, out, route.into()).await,
        Commands::Dataset(cmd) => dataset::run(&config, cmd).await,
    }
}
