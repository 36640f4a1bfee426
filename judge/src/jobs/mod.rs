//! Coordinator wire models

use serde::{Deserialize, Deserializer, Serialize};
use tracing::info;

use crate::core::JudgeStatus;

/// Job pulled from the coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub rid: i64,
    pub pid: i64,
    pub code: String,
    /// Language code, resolved at dispatch
    pub language: i32,
    pub time_limit: u64,   // ms
    pub memory_limit: u64, // KB
}

/// Intermediate or final status of a job, as reported to the coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerdictRecord {
    pub rid: i64,
    pub pid: i64,
    pub status: JudgeStatus,
    /// Peak CPU time, only reported for accepted jobs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_cost: Option<u64>,
    /// Peak memory, only reported for accepted jobs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_cost: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compilation_message: Option<String>,
}

impl VerdictRecord {
    pub fn log_try_send(&self) {
        match (self.status, self.time_cost, self.memory_cost) {
            (JudgeStatus::Accept, Some(time), Some(memory)) => info!(
                rid = self.rid,
                status = %self.status,
                time_cost = time,
                memory_cost = memory,
                "try send"
            ),
            _ => info!(rid = self.rid, status = %self.status, "try send"),
        }
    }

    pub fn log_send_success(&self) {
        match (self.status, self.time_cost, self.memory_cost) {
            (JudgeStatus::Accept, Some(time), Some(memory)) => info!(
                rid = self.rid,
                status = %self.status,
                time_cost = time,
                memory_cost = memory,
                "send success"
            ),
            _ => info!(rid = self.rid, status = %self.status, "send success"),
        }
    }
}

/// Body of `POST /mission-exchange`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeRequest {
    pub status: Vec<VerdictRecord>,
    pub judging_count: usize,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ExchangeResponse {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub problems: Vec<JobRecord>,
}

/// Body of `POST /check-test-case`
#[derive(Debug, Serialize, Deserialize)]
pub struct CheckRequest {
    pub pid: i64,
    pub filenames: Vec<String>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct CheckResponse {
    /// Files to download
    #[serde(default, deserialize_with = "null_as_empty")]
    pub filenames: Vec<String>,
    /// Files to delete
    #[serde(default, deserialize_with = "null_as_empty")]
    pub remove_filenames: Vec<String>,
}

impl CheckResponse {
    pub fn needs_sync(&self) -> bool {
        !self.filenames.is_empty() || !self.remove_filenames.is_empty()
    }
}

/// Accept `null` where a list is expected
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
