//! Supervised runner implementation
//!
//! Starts a child and polls it at a fixed interval, reading its resources
//! through a `ResourceSampler`. Limits are checked against running maxima;
//! the breaching sample is recorded before the child is killed.

use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use super::{CommandSpec, RunOutcome, RunStatus, WatchLimits};
use crate::monitor::ResourceSampler;

/// Standard streams for a supervised child
pub struct RunIo {
    pub stdin: Stdio,
    pub stdout: Stdio,
    pub stderr: Stdio,
}

/// Running maxima over the samples of one child
#[derive(Debug, Default, Clone, Copy)]
struct Peak {
    time_ms: u64,
    memory_kb: u64,
}

/// Runner that watches a child's resource usage while it runs
#[derive(Clone)]
pub struct SupervisedRunner {
    sampler: Arc<dyn ResourceSampler>,
    poll_interval: Duration,
}

impl SupervisedRunner {
    pub fn new(sampler: Arc<dyn ResourceSampler>, poll_interval: Duration) -> Self {
        Self {
            sampler,
            poll_interval,
        }
    }

    /// Run `cmd` until it exits or breaks a limit.
    ///
    /// Returns `Err` only if the child could not be started or waited on.
    pub async fn run(&self, cmd: &CommandSpec, io: RunIo, limits: &WatchLimits) -> Result<RunOutcome> {
        debug!("Starting {} {:?}", cmd.program, cmd.args);

        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .stdin(io.stdin)
            .stdout(io.stdout)
            .stderr(io.stderr)
            .kill_on_drop(true);
        if let Some(dir) = &cmd.work_dir {
            command.current_dir(dir);
        }

        let mut child = command
            .spawn()
            .with_context(|| format!("Failed to spawn {}", cmd.program))?;
        let pid = child.id();
        let started = Instant::now();
        let mut peak = Peak::default();

        loop {
            if let Some(exit) = child.try_wait().context("Failed to poll child")? {
                return Ok(outcome(exit_status(exit), peak));
            }

            if let Some(pid) = pid {
                let sample = self.sampler.sample(pid);
                if let Some(time_ms) = sample.cpu_time_ms {
                    peak.time_ms = peak.time_ms.max(time_ms);
                }
                if let Some(memory_kb) = sample.memory_kb {
                    peak.memory_kb = peak.memory_kb.max(memory_kb);
                }

                if peak.time_ms > limits.cpu_time_ms {
                    debug!("CPU time {}ms over limit {}ms", peak.time_ms, limits.cpu_time_ms);
                    return Ok(kill(&mut child, RunStatus::TimeLimitExceeded, peak).await);
                }
                if limits.memory_kb.is_some_and(|limit| peak.memory_kb > limit) {
                    debug!("Memory {}KB over limit", peak.memory_kb);
                    return Ok(kill(&mut child, RunStatus::MemoryLimitExceeded, peak).await);
                }
                if let (Some(written), Some(limit)) = (sample.write_bytes, limits.write_bytes) {
                    if written > limit {
                        debug!("Wrote {} bytes, over limit {}", written, limit);
                        return Ok(kill(&mut child, RunStatus::OutputLimitExceeded, peak).await);
                    }
                }
            }

            if started.elapsed() > limits.wall_time {
                debug!("Wall-clock ceiling {:?} exceeded", limits.wall_time);
                return Ok(kill(&mut child, RunStatus::TimeLimitExceeded, peak).await);
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

async fn kill(child: &mut Child, status: RunStatus, peak: Peak) -> RunOutcome {
    if let Err(e) = child.kill().await {
        warn!("Failed to kill child {:?}: {}", child.id(), e);
    }
    outcome(status, peak)
}

fn exit_status(exit: ExitStatus) -> RunStatus {
    match (exit.code(), exit.signal()) {
        (Some(code), _) => RunStatus::Exited(code),
        (None, Some(signal)) => RunStatus::Signaled(signal),
        (None, None) => RunStatus::Exited(-1),
    }
}

fn outcome(status: RunStatus, peak: Peak) -> RunOutcome {
    RunOutcome {
        status,
        time_ms: peak.time_ms,
        memory_kb: peak.memory_kb,
    }
}
