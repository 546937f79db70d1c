//! `predict`, `watch`, `status` and `download`.

use anyhow::Context;
use clap::Args;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use evolf_common::ClientConfig;
use evolf_predict::{
    download_results, render_table, result_url, BackoffPolicy, DownloadRoute, JobContext, JobSnapshot, JobState,
    JobSubmitter, JobWatch, PollHandle, PredictionBackend, PredictionClient, PredictionRequest, RequestBuilder,
    ResultRetriever,
};

#[derive(Args, Debug)]
pub struct PredictArgs {
    /// Receptor amino acid sequence, or @path to a .fasta/.fa/.txt file
    #[arg(short, long)]
    pub receptor: String,

    /// Ligand SMILES; repeat for several ligands
    #[arg(short, long = "smiles", value_name = "SMILES")]
    pub smiles: Vec<String>,

    /// Ligand names, matched to --smiles by position
    #[arg(short, long = "name", value_name = "NAME")]
    pub names: Vec<String>,

    /// CSV with a SMILES column (and optionally a name column)
    #[arg(long, value_name = "FILE")]
    pub csv: Option<PathBuf>,

    /// Mutation descriptor for the receptor, e.g. L249A
    #[arg(short, long)]
    pub mutation: Option<String>,

    /// Keep polling until every submitted job finishes
    #[arg(short, long)]
    pub watch: bool,

    /// With --watch, save each archive into this directory
    #[arg(short, long, value_name = "DIR")]
    pub out: Option<PathBuf>,
}

fn client(config: &ClientConfig) -> anyhow::Result<Arc<PredictionClient>> {
    Ok(Arc::new(PredictionClient::new(&config.api)?))
}

pub fn build_request(args: &PredictArgs) -> anyhow::Result<PredictionRequest> {
    let mut builder = RequestBuilder::new();

    match args.receptor.strip_prefix('@') {
        Some(path) => builder.set_receptor_from_file(path)?,
        None => builder.set_receptor_text(&args.receptor),
    }
    builder.set_mutation(args.mutation.as_deref());

    if let Some(path) = &args.csv {
        let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let import = builder.parse_ligands_from_csv(&text)?;
        if let Some(warning) = import.warning {
            warn!("{}", warning);
        }
    }

    for (i, smiles) in args.smiles.iter().enumerate() {
        let name = args.names.get(i).map(String::as_str).unwrap_or_default();
        let free = builder
            .ligand_fields()
            .iter()
            .find(|f| f.smiles.trim().is_empty())
            .map(|f| f.id);
        let id = match free {
            Some(id) => id,
            None => builder.add_ligand_field()?,
        };
        builder.set_ligand(id, smiles, name)?;
    }

    Ok(builder.build()?)
}

pub async fn run_predict(config: &ClientConfig, args: PredictArgs) -> anyhow::Result<()> {
    let request = build_request(&args)?;
    let backend = client(config)?;

    let receipts = JobSubmitter::new(Arc::clone(&backend)).submit(&request).await?;
    for receipt in &receipts {
        let ligand = &request.ligands()[receipt.ligand_index];
        println!(
            "{}  {}  {}",
            receipt.job_id,
            ligand.name.as_deref().unwrap_or(&ligand.smiles),
            receipt.message
        );
        println!("  {}", result_url(&config.site.base_url, &receipt.job_id)?);
    }

    if !args.watch {
        return Ok(());
    }

    let policy = BackoffPolicy::from(&config.polling);
    let mut handles = Vec::with_capacity(receipts.len());
    for receipt in &receipts {
        let context = JobContext::new(&receipt.job_id)?;
        handles.push(JobWatch::start(context, Arc::clone(&backend), policy));
    }
    let download = args.out.is_some();
    let out = args.out.unwrap_or_else(|| config.download.output_dir.clone());
    for handle in &handles {
        if !follow(handle, download, &out).await? {
            break;
        }
    }
    for handle in handles {
        handle.shutdown().await;
    }
    Ok(())
}

pub async fn run_watch(config: &ClientConfig, job: &str, download: bool, out: Option<PathBuf>) -> anyhow::Result<()> {
    let context = JobContext::from_navigation(job)?;
    let handle = JobWatch::start(context, client(config)?, BackoffPolicy::from(&config.polling));
    let out = out.unwrap_or_else(|| config.download.output_dir.clone());
    follow(&handle, download, &out).await?;
    handle.shutdown().await;
    Ok(())
}

/// Prints every status change of `handle` until the job is terminal.
/// Returns false when interrupted with Ctrl-C.
async fn follow<B>(handle: &PollHandle<B>, download: bool, out: &Path) -> anyhow::Result<bool>
where
    B: PredictionBackend + ?Sized,
{
    let mut rx = handle.subscribe();
    let mut last_polls = None;
    loop {
        let snapshot = rx.borrow_and_update().clone();
        if last_polls != Some(snapshot.polls) {
            last_polls = Some(snapshot.polls);
            print_progress(handle.job_id(), &snapshot);
        }
        if snapshot.state.is_terminal() {
            return finish(handle, &snapshot, download, out).await.map(|_| true);
        }

        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    return Ok(false);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping watch of job {}", handle.job_id());
                handle.cancel();
                return Ok(false);
            }
        }
    }
}

fn print_progress(job_id: &str, snapshot: &JobSnapshot) {
    let mut line = format!("[{}] {}", job_id, snapshot.state);
    if let Some(message) = snapshot.job.message.as_deref().filter(|m| !m.is_empty()) {
        line.push_str(&format!(": {}", message));
    }
    if let Some(error) = &snapshot.last_error {
        line.push_str(&format!(" (last poll failed: {})", error));
    }
    if let Some(next) = snapshot.next_poll_in {
        line.push_str(&format!(", next check in {}", human_duration(next)));
    }
    println!("{}", line);
}

async fn finish<B>(handle: &PollHandle<B>, snapshot: &JobSnapshot, download: bool, out: &Path) -> anyhow::Result<()>
where
    B: PredictionBackend + ?Sized,
{
    match snapshot.state {
        JobState::Completed => {
            if snapshot.job.predictions.is_empty() {
                println!("No prediction rows returned; files: {}", snapshot.job.output_files.join(", "));
            } else {
                print!("{}", render_table(&snapshot.job.predictions));
            }
            if download {
                let path = download_results(handle, out, DownloadRoute::JobQuery).await?;
                println!("Saved {}", path.display());
            }
        }
        JobState::Expired => {
            println!("Job {} not found or expired. Submit it again to get new results.", handle.job_id());
        }
        JobState::Running => {}
    }
    Ok(())
}

pub async fn run_status(config: &ClientConfig, job: &str) -> anyhow::Result<()> {
    let context = JobContext::from_navigation(job)?;
    let backend = client(config)?;
    let status = match backend.fetch_status(context.job_id()).await {
        Ok(s) => s,
        Err(e) if e.is_not_found() => {
            println!("{}: {}", context.job_id(), JobState::Expired);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let state = status.state();
    println!("{}: {}", context.job_id(), state);
    if let Some(message) = &status.message {
        println!("  {}", message);
    }
    if let Some(expires_at) = &status.expires_at {
        println!("  Results kept until {}", expires_at);
    }
    if state == JobState::Completed && !status.predictions.is_empty() {
        print!("{}", render_table(&status.predictions));
    }
    Ok(())
}

pub async fn run_download(
    config: &ClientConfig,
    job: &str,
    out: Option<PathBuf>,
    route: DownloadRoute,
) -> anyhow::Result<()> {
    let context = JobContext::from_navigation(job)?;
    let out = out.unwrap_or_else(|| config.download.output_dir.clone());
    let path = ResultRetriever::new(client(config)?)
        .retrieve(context.job_id(), &out, route)
        .await?;
    println!("Saved {}", path.display());
    Ok(())
}

/// `1h 5m`, `2m 30s`, `40s`.
fn human_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    match (h, m) {
        (0, 0) => format!("{}s", s),
        (0, _) if s == 0 => format!("{}m", m),
        (0, _) => format!("{}m {}s", m, s),
        _ => format!("{}h {}m", h, m),
    }
}
