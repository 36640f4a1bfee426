//! Transport module - everything that talks to the coordinator
//!
//! - `Coordinator`: the three coordinator endpoints as a trait
//! - `HttpCoordinator`: JSON over HTTP implementation
//! - `TransportLoop`: periodic verdict upload and job pull

pub mod client;
pub mod exchange;
#[cfg(test)]
pub(crate) mod stubs;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;

use crate::jobs::{CheckRequest, CheckResponse, ExchangeRequest, ExchangeResponse};

pub use client::HttpCoordinator;
pub use exchange::TransportLoop;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("coordinator answered {status} for {url}")]
    Status { status: StatusCode, url: String },
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// The coordinator as seen by this worker.
///
/// Every error is treated as transient by callers.
#[async_trait]
pub trait Coordinator: Send + Sync {
    /// Deliver verdicts and the current load, receive new jobs
    async fn exchange(&self, request: &ExchangeRequest) -> Result<ExchangeResponse, TransportError>;

    /// Compare the local file list of a problem with the authoritative one
    async fn check_test_cases(&self, request: &CheckRequest) -> Result<CheckResponse, TransportError>;

    /// Raw bytes of one test data file
    async fn download_test_case(&self, pid: i64, filename: &str) -> Result<Vec<u8>, TransportError>;
}
