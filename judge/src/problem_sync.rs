//! Per-problem test data synchronization
//!
//! Test data for a problem lives in `<data>/<pid>/` and is brought in line
//! with the coordinator's manifest before jobs read it. A problem is never
//! synced while one of its jobs is in flight, and jobs admitted while a sync
//! is pending or running wait in that problem's locked queue until it ends.
//!
//! A job counts as in flight from the moment it is pushed onto the mission
//! queue until its executor finishes, so queued jobs hold the data steady too.

use std::collections::{HashMap, VecDeque};
use std::fmt::Display;
use std::future::Future;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, Result};
use tempfile::NamedTempFile;
use tokio::fs;
use tracing::{error, info, warn};

use crate::config::SyncConfig;
use crate::core::utils::{is_plain_filename, is_test_data_file};
use crate::jobs::{CheckRequest, CheckResponse, JobRecord};
use crate::queue::MissionQueue;
use crate::transport::Coordinator;

/// Fixed-delay retry, optionally bounded
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub delay: Duration,
    /// `None` retries until success
    pub max_attempts: Option<u32>,
}

impl From<&SyncConfig> for RetryPolicy {
    fn from(config: &SyncConfig) -> Self {
        Self {
            delay: Duration::from_millis(config.retry_delay_ms),
            max_attempts: config.max_attempts,
        }
    }
}

impl RetryPolicy {
    /// Run `op` until it succeeds or the attempts are used up
    pub async fn run<T, E, F, Fut>(&self, what: &str, mut op: F) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if self.max_attempts.is_some_and(|max| attempt >= max) {
                        return Err(e);
                    }
                    warn!(
                        "{} failed (attempt {}): {}. Retrying in {:?}...",
                        what, attempt, e, self.delay
                    );
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[derive(Debug, Default)]
struct ProblemState {
    syncing: bool,
    in_flight: usize,
    locked: VecDeque<JobRecord>,
}

/// Decides when a problem's test data is refreshed and gates its jobs
pub struct ProblemSyncCoordinator {
    coordinator: Arc<dyn Coordinator>,
    data_root: PathBuf,
    missions: Arc<MissionQueue>,
    problems: Mutex<HashMap<i64, ProblemState>>,
    retry: RetryPolicy,
    check_attempts: u32,
}

impl ProblemSyncCoordinator {
    pub fn new(
        coordinator: Arc<dyn Coordinator>,
        data_root: PathBuf,
        missions: Arc<MissionQueue>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            coordinator,
            data_root,
            missions,
            problems: Mutex::new(HashMap::new()),
            retry: RetryPolicy::from(config),
            check_attempts: config.check_attempts.max(1),
        }
    }

    fn problems(&self) -> MutexGuard<'_, HashMap<i64, ProblemState>> {
        self.problems
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn data_dir(&self, pid: i64) -> PathBuf {
        self.data_root.join(pid.to_string())
    }

    /// Jobs admitted but not yet finished, across all problems
    pub fn judging_count(&self) -> usize {
        self.problems().values().map(|state| state.in_flight).sum()
    }

    /// Ask the coordinator whether the local data of `pid` is stale.
    ///
    /// `None` when the coordinator could not be reached.
    pub async fn check_needs_sync(&self, pid: i64) -> Option<CheckResponse> {
        match self.check(pid).await {
            Ok(response) => Some(response),
            Err(e) => {
                warn!(pid, "Test case check failed: {:#}", e);
                None
            }
        }
    }

    async fn check(&self, pid: i64) -> Result<CheckResponse> {
        let request = CheckRequest {
            pid,
            filenames: self.local_files(pid).await?,
        };
        Ok(self.coordinator.check_test_cases(&request).await?)
    }

    /// Sorted names of the local `*.in` / `*.out` files of `pid`
    async fn local_files(&self, pid: i64) -> Result<Vec<String>> {
        let dir = self.data_dir(pid);
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let mut entries = fs::read_dir(&dir).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if is_test_data_file(name) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Route a freshly received job to the mission queue or the locked queue
    pub async fn admit(self: &Arc<Self>, job: JobRecord) {
        let pid = job.pid;
        let stale = self
            .check_needs_sync(pid)
            .await
            .is_some_and(|response| response.needs_sync());

        let parked = {
            let mut problems = self.problems();
            let state = problems.entry(pid).or_default();
            if stale || state.syncing {
                info!(rid = job.rid, pid, "job waits for test case sync");
                state.locked.push_back(job);
                true
            } else {
                // data is current, so anything parked earlier can go too
                let released: Vec<_> = state.locked.drain(..).chain([job]).collect();
                state.in_flight += released.len();
                self.missions.extend(released);
                false
            }
        };

        if parked {
            self.request_sync(pid);
        }
    }

    /// Start a sync of `pid` once nothing of it is in flight.
    ///
    /// A no-op while a sync of `pid` is already running; jobs parked by then
    /// are released when it completes.
    pub fn request_sync(self: &Arc<Self>, pid: i64) {
        let start = claim_sync(self.problems().entry(pid).or_default());
        if start {
            self.spawn_sync(pid);
        }
    }

    /// Release the in-flight slot of a finished (or abandoned) job
    pub fn job_finished(self: &Arc<Self>, pid: i64) {
        {
            let mut problems = self.problems();
            let state = problems.entry(pid).or_default();
            state.in_flight = state.in_flight.saturating_sub(1);
        }
        self.request_sync(pid);
    }

    fn spawn_sync(self: &Arc<Self>, pid: i64) {
        // slots can be dropped while the runtime shuts down
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(pid, "No runtime to sync test cases on");
            return;
        };
        let this = Arc::clone(self);
        runtime.spawn(async move { this.sync(pid).await });
    }

    async fn sync(&self, pid: i64) {
        info!(pid, "test case sync start");

        let plan = RetryPolicy {
            delay: self.retry.delay,
            max_attempts: Some(self.check_attempts),
        }
        .run("Test case check", || self.check(pid))
        .await;

        match plan {
            Ok(plan) if plan.needs_sync() => self.apply(pid, plan).await,
            Ok(_) => {}
            Err(e) => error!(pid, "Giving up test case sync: {:#}", e),
        }

        self.complete_sync(pid);
        info!(pid, "test case sync complete");
    }

    async fn apply(&self, pid: i64, plan: CheckResponse) {
        let dir = self.data_dir(pid);

        for name in &plan.filenames {
            if !is_plain_filename(name) {
                warn!(pid, "Skipping unsafe filename {:?}", name);
                continue;
            }
            let what = format!("Download of {}/{}", pid, name);
            match self.retry.run(&what, || self.download(pid, &dir, name)).await {
                Ok(()) => info!(pid, file = %name, "downloaded"),
                Err(e) => error!(pid, "Giving up download of {}: {:#}", name, e),
            }
        }

        for name in &plan.remove_filenames {
            if !is_plain_filename(name) {
                warn!(pid, "Skipping unsafe filename {:?}", name);
                continue;
            }
            let what = format!("Removal of {}/{}", pid, name);
            match self.retry.run(&what, || remove_if_present(dir.join(name))).await {
                Ok(()) => info!(pid, file = %name, "removed"),
                Err(e) => error!(pid, "Giving up removal of {}: {:#}", name, e),
            }
        }
    }

    /// Fetch one file into a temporary file next to its target, then rename
    async fn download(&self, pid: i64, dir: &Path, name: &str) -> Result<()> {
        let bytes = self.coordinator.download_test_case(pid, name).await?;
        let dir = dir.to_path_buf();
        let target = dir.join(name);
        tokio::task::spawn_blocking(move || -> Result<()> {
            std::fs::create_dir_all(&dir)?;
            let mut tmp = NamedTempFile::new_in(&dir)?;
            tmp.write_all(&bytes)?;
            tmp.persist(&target)
                .with_context(|| format!("Failed to persist {}", target.display()))?;
            Ok(())
        })
        .await
        .context("Download writer panicked")?
    }

    fn complete_sync(&self, pid: i64) {
        let mut problems = self.problems();
        let state = problems.entry(pid).or_default();
        state.syncing = false;
        let released: Vec<_> = state.locked.drain(..).collect();
        if !released.is_empty() {
            info!(pid, jobs = released.len(), "releasing locked jobs");
        }
        state.in_flight += released.len();
        if state.in_flight == 0 {
            problems.remove(&pid);
        }
        self.missions.extend(released);
    }
}

/// Mark a sync as started if the problem is idle
fn claim_sync(state: &mut ProblemState) -> bool {
    if state.syncing || state.in_flight > 0 {
        return false;
    }
    state.syncing = true;
    true
}

async fn remove_if_present(path: PathBuf) -> Result<()> {
    match fs::remove_file(&path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}

/// An admitted job's claim on its problem, released on drop
pub struct InFlightSlot {
    sync: Arc<ProblemSyncCoordinator>,
    pid: i64,
}

impl InFlightSlot {
    pub fn new(sync: Arc<ProblemSyncCoordinator>, pid: i64) -> Self {
        Self { sync, pid }
    }
}

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        self.sync.job_finished(self.pid);
    }
}
