//! Runner module - supervised child-process execution
//!
//! This module starts a command and watches it until it exits or breaks
//! one of its limits:
//! - `CommandSpec`: what to start and where
//! - `WatchLimits`: CPU time, memory, output and wall-clock ceilings
//! - `SupervisedRunner`: spawn, poll the resource sampler, kill on breach
//!
//! The runner module does NOT:
//! - Compare outputs or determine verdicts
//! - Know about languages or test cases

pub mod supervised;

use std::path::{Path, PathBuf};
use std::time::Duration;

pub use supervised::{RunIo, SupervisedRunner};

/// Command specification for execution
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Program path or name
    pub program: String,
    /// Arguments to the program
    pub args: Vec<String>,
    /// Working directory
    pub work_dir: Option<PathBuf>,
}

impl CommandSpec {
    /// Create from a command vector (first element is program, rest are args)
    pub fn from_vec(cmd: &[String]) -> Self {
        let mut iter = cmd.iter();
        let program = iter.next().cloned().unwrap_or_default();
        let args: Vec<String> = iter.cloned().collect();
        Self {
            program,
            args,
            work_dir: None,
        }
    }

    pub fn with_work_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.work_dir = Some(dir.as_ref().to_path_buf());
        self
    }
}

/// Limits enforced while a child runs
#[derive(Debug, Clone)]
pub struct WatchLimits {
    /// CPU time limit in milliseconds
    pub cpu_time_ms: u64,
    /// Resident memory limit in KB
    pub memory_kb: Option<u64>,
    /// Ceiling on cumulative bytes written
    pub write_bytes: Option<u64>,
    /// Wall-clock ceiling, catches children that block without using CPU
    pub wall_time: Duration,
}

impl WatchLimits {
    /// CPU-only limits with a wall-clock ceiling of `cpu * factor + grace`
    pub fn cpu(cpu_time_ms: u64, wall_time_factor: u32, wall_time_grace: Duration) -> Self {
        Self {
            cpu_time_ms,
            memory_kb: None,
            write_bytes: None,
            wall_time: Duration::from_millis(cpu_time_ms.saturating_mul(wall_time_factor as u64))
                + wall_time_grace,
        }
    }

    pub fn with_memory_kb(mut self, memory_kb: u64) -> Self {
        self.memory_kb = Some(memory_kb);
        self
    }

    pub fn with_write_bytes(mut self, write_bytes: u64) -> Self {
        self.write_bytes = Some(write_bytes);
        self
    }
}

/// Execution status (raw, no verdict interpretation)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Program exited normally with given exit code
    Exited(i32),
    /// Terminated by a signal it did not get from us
    Signaled(i32),
    /// CPU time (or the wall-clock ceiling) exceeded, killed
    TimeLimitExceeded,
    /// Resident memory exceeded, killed
    MemoryLimitExceeded,
    /// Bytes written exceeded, killed
    OutputLimitExceeded,
}

/// Outcome of a supervised run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub status: RunStatus,
    /// Peak CPU time observed, in milliseconds
    pub time_ms: u64,
    /// Peak resident memory observed, in KB
    pub memory_kb: u64,
}
