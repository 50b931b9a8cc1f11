use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::error;

use hoops_ingest::orchestrator::EXIT_FATAL;
use hoops_ingest::supervisor::{CommandLauncher, RestartPolicy, SupervisorOutcome, supervise};
use hoops_ingest::telemetry;

/// Runs the ingest worker and relaunches it whenever it exits with the
/// restart code. Arguments after `--` are passed to the worker.
#[derive(Debug, Parser)]
#[command(name = "supervise", version)]
struct Args {
    #[arg(long)]
    worker: Option<PathBuf>,
    #[arg(long, env = "HOOPS_MAX_RESTARTS")]
    max_restarts: Option<u32>,
    #[arg(long, env = "HOOPS_RESTART_BACKOFF_SECS", default_value_t = 30)]
    backoff_secs: u64,
    #[arg(last = true)]
    worker_args: Vec<String>,
}

fn main() {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    telemetry::init_tracing();
    let args = Args::parse();

    let code = match run(args) {
        Ok(outcome) => {
            match outcome {
                SupervisorOutcome::Succeeded { restarts } => {
                    println!("Ingest finished after {restarts} restart(s)");
                }
                SupervisorOutcome::Failed { code, restarts } => {
                    println!("Worker failed with exit code {code} after {restarts} restart(s)");
                }
                SupervisorOutcome::RestartLimitReached { restarts } => {
                    println!("Gave up after {restarts} restart(s)");
                }
            }
            outcome.exit_code()
        }
        Err(err) => {
            error!("supervisor failed: {err:#}");
            EXIT_FATAL
        }
    };
    std::process::exit(code);
}

fn run(args: Args) -> Result<SupervisorOutcome> {
    let worker = match args.worker {
        Some(path) => path,
        None => default_worker()?,
    };
    let policy = RestartPolicy {
        max_restarts: args.max_restarts,
        backoff: Duration::from_secs(args.backoff_secs),
    };
    let mut launcher = CommandLauncher::new(worker, args.worker_args);
    supervise(&mut launcher, &policy, thread::sleep)
}

fn default_worker() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("locate supervisor executable")?;
    let dir = exe
        .parent()
        .context("supervisor executable has no parent directory")?;
    Ok(dir.join(format!("hoops_ingest{}", std::env::consts::EXE_SUFFIX)))
}
