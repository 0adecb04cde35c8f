//! `workerlink` command line
//!
//! Every command prints JSON on stdout so the output can be piped into other
//! tools; diagnostics go through `tracing` on stderr.

pub mod formatting;

use crate::config::HostConfig;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use workerlink_host::{
    run_process, FrameFailurePolicy, Job, JobGuard, JobResult, MediaReport, MediaSession,
    MediaSource, WorkerCatalog, WorkerDescription, WorkerLibrary,
};

#[derive(Parser, Debug)]
#[command(name = "workerlink")]
#[command(version)]
#[command(about = "Load workerlink worker libraries and drive jobs through them")]
pub struct Cli {
    /// Configuration file (created with defaults when missing)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Print a worker's descriptor table and parameter schema
    Describe {
        /// Worker library; defaults to the configured one
        #[arg(short, long)]
        library: Option<PathBuf>,
    },
    /// Load every worker library in a directory
    Scan {
        /// Directory to scan; defaults to the configured worker directory
        dir: Option<PathBuf>,
    },
    /// Run a generic job
    Process {
        #[arg(short, long)]
        library: Option<PathBuf>,
        #[arg(long, default_value_t = 1)]
        job_id: u64,
        /// Job parameter as key=value; repeatable
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, Value)>,
        /// JSON job message with `job_id` and `parameters`; replaces --job-id and --param
        #[arg(long, conflicts_with_all = ["params", "job_id"])]
        job: Option<PathBuf>,
    },
    /// Run the media lifecycle over a JSON-described source
    Media {
        #[arg(short, long)]
        library: Option<PathBuf>,
        #[arg(long, default_value_t = 1)]
        job_id: u64,
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, Value)>,
        /// Source description with `streams` and `frames`
        #[arg(short, long)]
        source: PathBuf,
        /// Overrides the configured frame failure policy
        #[arg(long)]
        policy: Option<FrameFailurePolicy>,
    },
    /// Print the effective configuration
    Config,
}

/// Parse `key=value`. Values that read as JSON numbers, booleans or arrays keep
/// that type; everything else is a string.
pub fn parse_param(input: &str) -> Result<(String, Value), String> {
    let (key, value) = input
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", input))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty parameter name in '{}'", input));
    }

    let value = match serde_json::from_str::<Value>(value) {
        Ok(parsed @ (Value::Number(_) | Value::Bool(_) | Value::Array(_))) => parsed,
        _ => Value::String(value.to_string()),
    };
    Ok((key.to_string(), value))
}

/// Run one command and return what should be printed
pub fn execute(command: &Command, config: &HostConfig) -> Result<String> {
    match command {
        Command::Describe { library } => {
            let library = open_library(library.as_deref(), config)?;
            let description = library
                .describe()
                .with_context(|| format!("Failed to describe {}", library.path().display()))?;
            formatting::to_json(&formatting::describe_output(&description))
        }
        Command::Scan { dir } => {
            let dir = match dir {
                Some(dir) => dir.clone(),
                None => config
                    .worker_directory()
                    .context("No directory given and no worker directory configured")?,
            };
            let (stats, descriptions) = scan_directory(&dir)?;
            formatting::to_json(&formatting::scan_output(&dir, &stats, &descriptions))
        }
        Command::Process {
            library,
            job_id,
            params,
            job,
        } => {
            let library = open_library(library.as_deref(), config)?;
            let job = match job {
                Some(path) => read_job(path)?,
                None => build_job(*job_id, params),
            };
            let result = process_job(&library, job)?;
            formatting::to_json(&result)
        }
        Command::Media {
            library,
            job_id,
            params,
            source,
            policy,
        } => {
            let library = open_library(library.as_deref(), config)?;
            let source = MediaSource::from_file(source)
                .with_context(|| format!("Failed to read source {}", source.display()))?;
            let policy = policy.unwrap_or_else(|| config.frame_failure_policy());
            let report = media_job(&library, build_job(*job_id, params), &source, policy)?;
            formatting::to_json(&report)
        }
        Command::Config => Ok(config.summary()),
    }
}

fn open_library(library: Option<&Path>, config: &HostConfig) -> Result<WorkerLibrary> {
    let path = match library {
        Some(path) => workerlink_host::expand_tilde(path),
        None => config.library_path(),
    };
    debug!("Opening worker library {}", path.display());
    WorkerLibrary::load(&path).with_context(|| format!("Failed to load worker {}", path.display()))
}

fn read_job(path: &Path) -> Result<Job> {
    let message = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read job {}", path.display()))?;
    Job::from_message(&message).with_context(|| format!("Invalid job {}", path.display()))
}

pub fn build_job(job_id: u64, params: &[(String, Value)]) -> Job {
    params
        .iter()
        .fold(Job::new(job_id), |job, (key, value)| {
            job.with_parameter(key.clone(), value.clone())
        })
}

/// Run a generic job against an opened library
pub fn process_job(library: &WorkerLibrary, job: Job) -> Result<JobResult> {
    job.validate()?;
    let job = JobGuard::register(job);
    info!(job_id = job.job_id(), "Running generic job");
    Ok(run_process(library, &job)?)
}

/// Run a media job against an opened library
pub fn media_job(
    library: &WorkerLibrary,
    job: Job,
    source: &MediaSource,
    policy: FrameFailurePolicy,
) -> Result<MediaReport> {
    job.validate()?;
    if !library.is_media() {
        bail!(
            "{} is a {:?} worker, not a media worker",
            library.path().display(),
            library.kind()
        );
    }
    let job = JobGuard::register(job);
    info!(job_id = job.job_id(), ?policy, "Running media job");
    Ok(MediaSession::run(library, &job, source, policy)?)
}

/// Load every worker in `dir`, returning the scan statistics and what each
/// accepted worker declared
pub fn scan_directory(
    dir: &Path,
) -> Result<(workerlink_host::LoadStats, Vec<WorkerDescription>)> {
    let mut catalog = WorkerCatalog::new();
    let stats = catalog
        .load_directory(dir)
        .with_context(|| format!("Failed to scan {}", dir.display()))?;
    let descriptions = catalog
        .workers()
        .iter()
        .map(|w| w.description.clone())
        .collect();
    Ok((stats, descriptions))
}
