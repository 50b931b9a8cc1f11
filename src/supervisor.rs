use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::orchestrator::{EXIT_FATAL, EXIT_RESTART, EXIT_SUCCESS};

pub trait WorkerLauncher {
    fn launch(&mut self, attempt: u32) -> Result<i32>;
}

pub struct CommandLauncher {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandLauncher {
    pub fn new(program: PathBuf, args: Vec<String>) -> Self {
        Self { program, args }
    }
}

impl WorkerLauncher for CommandLauncher {
    fn launch(&mut self, attempt: u32) -> Result<i32> {
        info!(attempt, program = %self.program.display(), "launching worker");
        let status = Command::new(&self.program)
            .args(&self.args)
            .status()
            .with_context(|| format!("spawn worker {}", self.program.display()))?;
        // Killed by a signal: no code, never a restart.
        Ok(status.code().unwrap_or(EXIT_FATAL))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartPolicy {
    /// `None` restarts without limit.
    pub max_restarts: Option<u32>,
    pub backoff: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            max_restarts: None,
            backoff: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorOutcome {
    Succeeded { restarts: u32 },
    Failed { code: i32, restarts: u32 },
    RestartLimitReached { restarts: u32 },
}

impl SupervisorOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            SupervisorOutcome::Succeeded { .. } => EXIT_SUCCESS,
            SupervisorOutcome::Failed { code, .. } => *code,
            SupervisorOutcome::RestartLimitReached { .. } => EXIT_RESTART,
        }
    }
}

pub fn supervise<L, F>(launcher: &mut L, policy: &RestartPolicy, mut sleep: F) -> Result<SupervisorOutcome>
where
    L: WorkerLauncher,
    F: FnMut(Duration),
{
    let mut restarts = 0u32;
    loop {
        let code = launcher.launch(restarts + 1)?;
        match code {
            EXIT_SUCCESS => {
                info!(restarts, "worker finished");
                return Ok(SupervisorOutcome::Succeeded { restarts });
            }
            EXIT_RESTART => {
                if policy.max_restarts.is_some_and(|max| restarts >= max) {
                    error!(restarts, "restart limit reached");
                    return Ok(SupervisorOutcome::RestartLimitReached { restarts });
                }
                restarts += 1;
                warn!(
                    restarts,
                    backoff_secs = policy.backoff.as_secs_f64(),
                    "worker requested restart"
                );
                sleep(policy.backoff);
            }
            code => {
                error!(code, restarts, "worker failed");
                return Ok(SupervisorOutcome::Failed { code, restarts });
            }
        }
    }
}
