//! Reconstruction pipeline CLI (spec.md §6): submit a video for
//! reconstruction, watch its progress, cancel it, or delete its workspace.
//!
//! Grounded in `braid-process-video`'s clap-derive CLI shape; the teacher
//! itself has no CLI surface to draw from.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use recon_models::{JobId, QualityTag};
use recon_scheduler::{Orchestrator, SchedulerConfig};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "reconstruct", about = "Structure-from-motion / multi-view-stereo pipeline orchestrator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the orchestrator: accept submissions and run worker threads.
    Run {
        #[arg(long)]
        workspace: PathBuf,
        #[arg(long)]
        workers: Option<usize>,
        /// Path to a video file to submit immediately on startup.
        #[arg(long)]
        submit: Option<PathBuf>,
        #[arg(long, default_value = "medium")]
        quality: String,
    },
    /// Print a job's current progress document.
    Status {
        job_id: String,
        #[arg(long)]
        workspace: PathBuf,
    },
    /// Request cancellation of a running or pending job.
    Cancel {
        job_id: String,
        #[arg(long)]
        workspace: PathBuf,
    },
    /// Remove a terminal job's record and workspace directory.
    Delete {
        job_id: String,
        #[arg(long)]
        workspace: PathBuf,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive("recon=info".parse().unwrap()))
        .init();

    let cli = Cli::parse();
    match run(cli.command) {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = %err, "command failed");
            ExitCode::from(1)
        }
    }
}

fn run(command: Command) -> Result<ExitCode, recon_models::ReconError> {
    match command {
        Command::Run { workspace, workers, submit, quality } => cmd_run(workspace, workers, submit, quality),
        Command::Status { job_id, workspace } => cmd_status(workspace, job_id),
        Command::Cancel { job_id, workspace } => cmd_cancel(workspace, job_id),
        Command::Delete { job_id, workspace } => cmd_delete(workspace, job_id),
    }
}

fn cmd_run(workspace: PathBuf, workers: Option<usize>, submit: Option<PathBuf>, quality: String) -> Result<ExitCode, recon_models::ReconError> {
    let Ok(tag) = QualityTag::parse(&quality) else {
        eprintln!("invalid quality tag: {quality}");
        return Ok(ExitCode::from(2));
    };

    let mut config = SchedulerConfig::from_env(workspace);
    if let Some(workers) = workers {
        config = config.with_workers(workers);
    }

    let orchestrator = std::sync::Arc::new(Orchestrator::new(config));
    let _workers = orchestrator.spawn_workers();

    if let Some(video) = submit {
        let id = orchestrator.submit_job(video.display().to_string(), tag, None)?;
        println!("{id}");
    }

    tracing::info!("orchestrator running, press ctrl-c to exit");
    loop {
        std::thread::park();
    }
}

fn cmd_status(workspace: PathBuf, job_id: String) -> Result<ExitCode, recon_models::ReconError> {
    let layout = recon_layout::JobLayout::new(workspace, JobId::from_string(job_id.clone()));
    match recon_scheduler::progress_io::read_progress(&layout) {
        Ok(document) => {
            println!("{}", serde_json::to_string_pretty(&document).expect("ProgressDocument always serializes"));
            Ok(ExitCode::from(0))
        }
        Err(_) => {
            eprintln!("job not found: {job_id}");
            Ok(ExitCode::from(3))
        }
    }
}

// `cancel` and `delete` mutate the on-disk progress document directly
// rather than going through an `Orchestrator`/`JobStore`: each CLI
// invocation is its own short-lived process, separate from whatever `run`
// daemon (if any) owns the job's in-memory state (spec.md §6's CLI is
// deliberately minimal; the stateful management API is the out-of-scope
// external HTTP layer).
fn cmd_cancel(workspace: PathBuf, job_id: String) -> Result<ExitCode, recon_models::ReconError> {
    let layout = recon_layout::JobLayout::new(workspace, JobId::from_string(job_id.clone()));
    match recon_scheduler::progress_io::cancel_on_disk(&layout) {
        Ok(()) => Ok(ExitCode::from(0)),
        Err(recon_models::ReconError::IoError { .. }) => {
            eprintln!("job not found: {job_id}");
            Ok(ExitCode::from(3))
        }
        Err(err) => Err(err),
    }
}

fn cmd_delete(workspace: PathBuf, job_id: String) -> Result<ExitCode, recon_models::ReconError> {
    let layout = recon_layout::JobLayout::new(workspace, JobId::from_string(job_id.clone()));
    match recon_scheduler::progress_io::delete_on_disk(&layout) {
        Ok(()) => Ok(ExitCode::from(0)),
        Err(recon_models::ReconError::IoError { .. }) => {
            eprintln!("job not found: {job_id}");
            Ok(ExitCode::from(3))
        }
        Err(recon_models::ReconError::JobNotTerminal(_)) => {
            eprintln!("job {job_id} is not terminal, refusing to delete");
            Ok(ExitCode::from(4))
        }
        Err(err) => Err(err),
    }
}
