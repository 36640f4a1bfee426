//! In-memory mission and status queues shared between the transport loop,
//! the problem sync coordinator and the job executors.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::Notify;

use crate::jobs::{JobRecord, VerdictRecord};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// FIFO of jobs admitted for execution
#[derive(Default)]
pub struct MissionQueue {
    jobs: Mutex<VecDeque<JobRecord>>,
    notify: Notify,
}

impl MissionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, job: JobRecord) {
        lock(&self.jobs).push_back(job);
        self.notify.notify_one();
    }

    pub fn extend(&self, jobs: impl IntoIterator<Item = JobRecord>) {
        let mut queue = lock(&self.jobs);
        let before = queue.len();
        queue.extend(jobs);
        let added = queue.len() - before;
        drop(queue);
        for _ in 0..added {
            self.notify.notify_one();
        }
    }

    pub fn try_pop(&self) -> Option<JobRecord> {
        lock(&self.jobs).pop_front()
    }

    /// Wait until a job is available and take it
    pub async fn pop(&self) -> JobRecord {
        loop {
            if let Some(job) = self.try_pop() {
                return job;
            }
            self.notify.notified().await;
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.jobs).len()
    }
}

/// FIFO of verdicts waiting to be delivered.
///
/// Verdicts are only removed after the coordinator acknowledged them, so a
/// batch is peeked, sent, and then removed from the front.
#[derive(Default)]
pub struct StatusQueue {
    records: Mutex<VecDeque<VerdictRecord>>,
}

impl StatusQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, record: VerdictRecord) {
        lock(&self.records).push_back(record);
    }

    /// Copy of up to `max` records from the front
    pub fn peek(&self, max: usize) -> Vec<VerdictRecord> {
        lock(&self.records).iter().take(max).cloned().collect()
    }

    /// Drop `count` records from the front after a confirmed delivery.
    ///
    /// Only the transport loop removes records, so the front is still the
    /// batch it peeked; later pushes land behind it.
    pub fn remove_front(&self, count: usize) {
        let mut records = lock(&self.records);
        let count = count.min(records.len());
        records.drain(..count);
    }

    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }
}
