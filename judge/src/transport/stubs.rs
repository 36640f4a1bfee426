//! In-memory coordinator for tests

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::StatusCode;

use super::{Coordinator, TransportError};
use crate::jobs::{CheckRequest, CheckResponse, ExchangeRequest, ExchangeResponse, JobRecord};

fn unavailable() -> TransportError {
    TransportError::Status {
        status: StatusCode::SERVICE_UNAVAILABLE,
        url: "stub".to_string(),
    }
}

/// Take one unit from a failure budget, `true` if this call should fail
fn consume(budget: &AtomicU32) -> bool {
    budget
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
        .is_ok()
}

#[derive(Default)]
pub(crate) struct StubCoordinator {
    /// Authoritative test data per problem
    remote: Mutex<HashMap<i64, BTreeMap<String, Vec<u8>>>>,
    pending_jobs: Mutex<Vec<JobRecord>>,
    exchanges: Mutex<Vec<ExchangeRequest>>,
    pub(crate) failing_exchanges: AtomicU32,
    pub(crate) failing_checks: AtomicU32,
    pub(crate) failing_downloads: AtomicU32,
    pub(crate) downloads: AtomicU32,
}

impl StubCoordinator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn publish(&self, pid: i64, filename: &str, content: &str) {
        self.remote
            .lock()
            .unwrap()
            .entry(pid)
            .or_default()
            .insert(filename.to_string(), content.as_bytes().to_vec());
    }

    pub(crate) fn queue_job(&self, job: JobRecord) {
        self.pending_jobs.lock().unwrap().push(job);
    }

    pub(crate) fn exchanges(&self) -> Vec<ExchangeRequest> {
        self.exchanges.lock().unwrap().clone()
    }
}

#[async_trait]
impl Coordinator for StubCoordinator {
    async fn exchange(&self, request: &ExchangeRequest) -> Result<ExchangeResponse, TransportError> {
        if consume(&self.failing_exchanges) {
            return Err(unavailable());
        }
        self.exchanges.lock().unwrap().push(request.clone());
        let problems = std::mem::take(&mut *self.pending_jobs.lock().unwrap());
        Ok(ExchangeResponse { problems })
    }

    async fn check_test_cases(&self, request: &CheckRequest) -> Result<CheckResponse, TransportError> {
        if consume(&self.failing_checks) {
            return Err(unavailable());
        }
        let remote = self.remote.lock().unwrap();
        let files = remote.get(&request.pid).cloned().unwrap_or_default();
        let filenames = files
            .keys()
            .filter(|name| !request.filenames.contains(name))
            .cloned()
            .collect();
        let remove_filenames = request
            .filenames
            .iter()
            .filter(|name| !files.contains_key(*name))
            .cloned()
            .collect();
        Ok(CheckResponse {
            filenames,
            remove_filenames,
        })
    }

    async fn download_test_case(&self, pid: i64, filename: &str) -> Result<Vec<u8>, TransportError> {
        if consume(&self.failing_downloads) {
            return Err(unavailable());
        }
        self.downloads.fetch_add(1, Ordering::SeqCst);
        self.remote
            .lock()
            .unwrap()
            .get(&pid)
            .and_then(|files| files.get(filename))
            .cloned()
            .ok_or_else(unavailable)
    }
}
