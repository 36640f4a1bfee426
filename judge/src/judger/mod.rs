//! Judger module for executing one job end to end
//!
//! A `JobExecutor` owns one `Job` and walks it through its stages:
//! workspace setup, compilation, and one run plus comparison per test case.
//! Every stage reports the job's status onto the shared `StatusQueue`, so
//! the coordinator sees `Compiling`, the post-compile status, and (when the
//! job got that far) the final verdict.

pub mod compare;

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::fs;
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::{JudgeConfig, PathConfig};
use crate::core::utils::input_base_name;
use crate::core::JudgeStatus;
use crate::jobs::{JobRecord, VerdictRecord};
use crate::languages::{Language, LanguageProfile};
use crate::queue::StatusQueue;
use crate::runner::{CommandSpec, RunIo, RunStatus, SupervisedRunner, WatchLimits};

use compare::{compare_output, Comparison};

const COMPILE_LOG: &str = "compile.log";

/// A job being judged on this worker
#[derive(Debug, Clone)]
pub struct Job {
    pub rid: i64,
    pub pid: i64,
    pub code: String,
    pub language: Language,
    pub time_limit_ms: u64,
    pub memory_limit_kb: u64,
    pub status: JudgeStatus,
    /// Peak CPU time over all test cases run so far
    pub time_cost: u64,
    /// Peak memory over all test cases run so far
    pub memory_cost: u64,
    pub compilation_message: String,
    /// Base names of the test cases, lexicographically sorted
    pub test_cases: Vec<String>,
}

impl Job {
    pub fn from_record(record: JobRecord, language: Language) -> Self {
        Self {
            rid: record.rid,
            pid: record.pid,
            code: record.code,
            language,
            time_limit_ms: record.time_limit,
            memory_limit_kb: record.memory_limit,
            status: JudgeStatus::Waiting,
            time_cost: 0,
            memory_cost: 0,
            compilation_message: String::new(),
            test_cases: Vec::new(),
        }
    }

    /// Snapshot for the coordinator. Costs are only meaningful for accepted jobs.
    pub fn verdict(&self) -> VerdictRecord {
        let accepted = self.status == JudgeStatus::Accept;
        VerdictRecord {
            rid: self.rid,
            pid: self.pid,
            status: self.status,
            time_cost: accepted.then_some(self.time_cost),
            memory_cost: accepted.then_some(self.memory_cost),
            compilation_message: (!self.compilation_message.is_empty())
                .then(|| self.compilation_message.clone()),
        }
    }
}

/// Everything an executor needs besides the job itself
pub struct JudgeContext {
    pub paths: PathConfig,
    pub limits: JudgeConfig,
    pub runner: SupervisedRunner,
    pub status_queue: Arc<StatusQueue>,
}

pub struct JobExecutor {
    job: Job,
    profile: LanguageProfile,
    ctx: Arc<JudgeContext>,
}

impl JobExecutor {
    pub fn new(job: Job, profile: LanguageProfile, ctx: Arc<JudgeContext>) -> Self {
        Self { job, profile, ctx }
    }

    /// Judge the job and return it in its final state
    pub async fn run(self) -> Job {
        let span = info_span!("job", rid = self.job.rid, pid = self.job.pid);
        self.execute().instrument(span).await
    }

    async fn execute(mut self) -> Job {
        info!(language = %self.job.language, "mission start");

        self.job.status = JudgeStatus::Compiling;
        self.report();

        match self.init_workspace().await {
            Ok(()) => self.compile().await,
            Err(e) => {
                error!("Workspace initialization failed: {:#}", e);
                self.job.status = JudgeStatus::SystemError;
            }
        }
        self.report();

        if self.job.status == JudgeStatus::WaitingRunning {
            self.judge().await;
            self.report();
        }

        if self.job.status.is_terminal() || self.job.status == JudgeStatus::PresentationError {
            info!(status = %self.job.status, "mission complete");
        } else {
            error!(status = %self.job.status, "mission ended without a verdict");
        }
        self.job
    }

    fn work_dir(&self) -> PathBuf {
        self.ctx.paths.work_dir(self.job.rid)
    }

    fn data_dir(&self) -> PathBuf {
        self.ctx.paths.data_dir(self.job.pid)
    }

    fn report(&self) {
        self.ctx.status_queue.push(self.job.verdict());
    }

    /// Collect the test cases and write the source into a fresh work directory
    async fn init_workspace(&mut self) -> Result<()> {
        let data_dir = self.data_dir();
        let mut entries = fs::read_dir(&data_dir)
            .await
            .with_context(|| format!("Failed to list {}", data_dir.display()))?;

        let mut test_cases = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(base) = name.to_str().and_then(input_base_name) else {
                continue;
            };
            let expected = data_dir.join(format!("{}.out", base));
            if fs::try_exists(&expected).await.unwrap_or(false) {
                test_cases.push(base.to_string());
            } else {
                warn!("Skipping test case {} without expected output", base);
            }
        }
        test_cases.sort();
        self.job.test_cases = test_cases;

        let work_dir = self.work_dir();
        fs::create_dir_all(&work_dir)
            .await
            .with_context(|| format!("Failed to create {}", work_dir.display()))?;
        fs::write(work_dir.join(&self.profile.source_file), &self.job.code)
            .await
            .context("Failed to write source file")?;
        Ok(())
    }

    async fn compile(&mut self) {
        let work_dir = self.work_dir();
        let log_path = work_dir.join(COMPILE_LOG);
        let io = match compile_log_io(&log_path).await {
            Ok(io) => io,
            Err(e) => {
                warn!("Cannot open compile log, using stdout: {:#}", e);
                RunIo {
                    stdin: Stdio::null(),
                    stdout: Stdio::inherit(),
                    stderr: Stdio::inherit(),
                }
            }
        };

        let cmd = CommandSpec::from_vec(&self.profile.compile_command).with_work_dir(&work_dir);
        let limits = WatchLimits::cpu(
            self.ctx.limits.compile_time_limit_ms,
            self.ctx.limits.wall_time_factor,
            self.ctx.limits.wall_time_grace(),
        );

        self.job.status = match self.ctx.runner.run(&cmd, io, &limits).await {
            Ok(outcome) => match outcome.status {
                RunStatus::Exited(0) => JudgeStatus::WaitingRunning,
                RunStatus::Exited(1) | RunStatus::Exited(2) => JudgeStatus::CompilationError,
                RunStatus::TimeLimitExceeded => JudgeStatus::CompilationTimeLimitExceeded,
                other => {
                    error!("Compiler ended unexpectedly: {:?}", other);
                    JudgeStatus::SystemError
                }
            },
            Err(e) => {
                error!("Failed to run compiler: {:#}", e);
                JudgeStatus::SystemError
            }
        };

        if let Ok(log) = fs::read(&log_path).await {
            self.job.compilation_message = String::from_utf8_lossy(&log).into_owned();
        }
        info!(status = %self.job.status, "compile finished");
    }

    async fn judge(&mut self) {
        let test_cases = self.job.test_cases.clone();
        for name in &test_cases {
            if !self.job.status.keeps_judging() {
                break;
            }
            self.run_case(name).await;
            if self.job.status.keeps_judging() {
                self.compare_case(name).await;
            }
        }

        if self.job.status == JudgeStatus::WaitingRunning {
            self.job.status = JudgeStatus::Accept;
        }
        info!(
            status = %self.job.status,
            time_cost = self.job.time_cost,
            memory_cost = self.job.memory_cost,
            "judge finished"
        );
    }

    async fn run_case(&mut self, name: &str) {
        let input_path = self.data_dir().join(format!("{}.in", name));
        let output_path = self.work_dir().join(format!("{}.out", name));
        let io = match case_io(&input_path, &output_path).await {
            Ok(io) => io,
            Err(e) => {
                error!("Test case {} setup failed: {:#}", name, e);
                self.job.status = JudgeStatus::SystemError;
                return;
            }
        };

        let cmd = CommandSpec::from_vec(&self.profile.run_command).with_work_dir(self.work_dir());
        let limits = WatchLimits::cpu(
            self.job.time_limit_ms,
            self.ctx.limits.wall_time_factor,
            self.ctx.limits.wall_time_grace(),
        )
        .with_memory_kb(self.job.memory_limit_kb)
        .with_write_bytes(self.ctx.limits.output_limit_bytes);

        let outcome = match self.ctx.runner.run(&cmd, io, &limits).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Test case {} failed to run: {:#}", name, e);
                self.job.status = JudgeStatus::SystemError;
                return;
            }
        };

        self.job.time_cost = self.job.time_cost.max(outcome.time_ms);
        self.job.memory_cost = self.job.memory_cost.max(outcome.memory_kb);

        let status = match outcome.status {
            RunStatus::Exited(0) => None,
            RunStatus::Exited(_) | RunStatus::Signaled(_) => Some(JudgeStatus::RuntimeError),
            RunStatus::TimeLimitExceeded => Some(JudgeStatus::TimeLimitExceeded),
            RunStatus::MemoryLimitExceeded => Some(JudgeStatus::MemoryLimitExceeded),
            RunStatus::OutputLimitExceeded => Some(JudgeStatus::OutputLimitExceeded),
        };
        if let Some(status) = status {
            info!(test_case = name, status = %status, "test case failed");
            self.job.status = status;
        }
    }

    async fn compare_case(&mut self, name: &str) {
        let actual = fs::read(self.work_dir().join(format!("{}.out", name))).await;
        let expected = fs::read(self.data_dir().join(format!("{}.out", name))).await;
        let (actual, expected) = match (actual, expected) {
            (Ok(actual), Ok(expected)) => (actual, expected),
            (Err(e), _) | (_, Err(e)) => {
                error!("Cannot read outputs of test case {}: {}", name, e);
                self.job.status = JudgeStatus::SystemError;
                return;
            }
        };

        match compare_output(&actual, &expected) {
            Comparison::Match => {}
            Comparison::Presentation => {
                if self.job.status == JudgeStatus::WaitingRunning {
                    self.job.status = JudgeStatus::PresentationError;
                }
            }
            Comparison::Mismatch => {
                info!(test_case = name, "wrong answer");
                self.job.status = JudgeStatus::WrongAnswer;
            }
        }
    }
}

/// Compiler output goes to `compile.log`, both streams
async fn compile_log_io(log_path: &Path) -> Result<RunIo> {
    let log = fs::File::create(log_path).await?.into_std().await;
    let log_err = log.try_clone()?;
    Ok(RunIo {
        stdin: Stdio::null(),
        stdout: Stdio::from(log),
        stderr: Stdio::from(log_err),
    })
}

async fn case_io(input_path: &Path, output_path: &Path) -> Result<RunIo> {
    let input = fs::File::open(input_path)
        .await
        .with_context(|| format!("Failed to open {}", input_path.display()))?
        .into_std()
        .await;
    let output = fs::File::create(output_path)
        .await
        .with_context(|| format!("Failed to create {}", output_path.display()))?
        .into_std()
        .await;
    Ok(RunIo {
        stdin: Stdio::from(input),
        stdout: Stdio::from(output),
        stderr: Stdio::null(),
    })
}
