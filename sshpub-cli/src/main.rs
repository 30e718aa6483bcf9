use anyhow::{anyhow, bail, Context, Result};
use chrono::Local;
use clap::Parser;
use sshpub_core::{
    join_all, FileStatus, HostRegistry, JobResult, PublishConfig, PublishJob, PublishManager,
    TransferExecutor,
};
use sshpub_remote_sftp::SftpConnector;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::{fs, process::ExitCode};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sshpub", version, about = "sshpub – publish build artifacts over SSH")]
struct Cli {
    /// Path to config file (YAML / JSON)
    #[arg(short, long, default_value = "sshpub.yaml")]
    config: PathBuf,

    /// Directory source file patterns are resolved against
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    /// Variable for `$NAME` substitution, as KEY=VALUE (repeatable)
    #[arg(short = 'e', long = "env", value_parser = parse_var)]
    vars: Vec<(String, String)>,

    /// Only run jobs targeting these host configurations
    #[arg(long = "host")]
    hosts: Vec<String>,

    /// Validate and print the planned uploads without connecting
    #[arg(long)]
    dry_run: bool,
}

fn parse_var(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.to_string())),
        _ => Err(format!("expected KEY=VALUE, got `{s}`")),
    }
}

fn load_config(path: &Path) -> Result<PublishConfig> {
    let text = fs::read_to_string(path)
        .map_err(|e| anyhow!("read config {} failed: {e}", path.display()))?;
    // Detect format by extension
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("");
    let cfg: PublishConfig = match ext {
        "json" => serde_json::from_str(&text)?,
        _ => serde_yaml::from_str(&text)?,
    };
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

fn select_jobs(cfg: &PublishConfig, hosts: &[String]) -> Vec<PublishJob> {
    cfg.jobs
        .iter()
        .filter(|job| hosts.is_empty() || hosts.contains(&job.host))
        .cloned()
        .collect()
}

fn dry_run(jobs: &[PublishJob], root: &Path, env: HashMap<String, String>) -> Result<()> {
    let executor = TransferExecutor::new(root).with_env(env);
    let now = Local::now();
    for job in jobs {
        println!("[{}]", job.host);
        for (idx, spec) in job.transfers.iter().enumerate() {
            let plan = executor
                .plan(spec, &now)
                .with_context(|| format!("transfer #{} for {}", idx + 1, job.host))?;
            for file in plan {
                println!("  {} -> {}", file.relative, file.remote);
            }
            if spec.has_exec_command() {
                println!("  exec: {}", spec.exec_command);
            }
        }
    }
    Ok(())
}

/// Log one line per job; returns the number of failed jobs.
fn report(jobs: &[PublishJob], results: &[JobResult]) -> usize {
    let mut failed = 0;
    for (job, res) in jobs.iter().zip(results) {
        match res {
            Ok(steps) => {
                let uploaded: usize = steps.iter().map(|r| r.uploaded()).sum();
                if let Some(bad) = steps.iter().find(|r| !r.succeeded()) {
                    failed += 1;
                    for file in &bad.files {
                        if let FileStatus::Failed(e) = &file.status {
                            error!("{}: {} failed: {e}", job.host, file.local.display());
                        }
                    }
                    if let Some(e) = &bad.error {
                        error!("{}: {} ({} file(s) uploaded)", job.host, e.kind(), uploaded);
                    }
                } else {
                    info!("{}: ok, {} file(s) uploaded", job.host, uploaded);
                }
            }
            Err(e) => {
                failed += 1;
                error!("{}: {} - {e}", job.host, e.kind());
            }
        }
    }
    failed
}

async fn run(cli: Cli) -> Result<()> {
    let cfg = load_config(&cli.config)?;
    let jobs = select_jobs(&cfg, &cli.hosts);
    if jobs.is_empty() {
        bail!("no jobs to run in {}", cli.config.display());
    }
    let env: HashMap<String, String> = cli.vars.into_iter().collect();

    if cli.dry_run {
        return dry_run(&jobs, &cli.root, env);
    }

    let registry = Arc::new(HostRegistry::from_config(&cfg)?);
    let manager = PublishManager::new(registry, SftpConnector, &cli.root).with_env(env);

    let handles = manager.spawn_all(jobs.clone());
    let stoppers: Vec<_> = handles.iter().map(|h| h.stopper()).collect();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted, closing sessions");
            for s in &stoppers {
                s.stop();
            }
        }
    });
    let results = join_all(handles).await;

    match report(&jobs, &results) {
        0 => Ok(()),
        n => Err(anyhow!("{n} of {} job(s) failed", jobs.len())),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
