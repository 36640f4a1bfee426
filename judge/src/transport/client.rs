//! HTTP client for the coordinator

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use super::{Coordinator, TransportError};
use crate::config::ServerConfig;
use crate::jobs::{CheckRequest, CheckResponse, ExchangeRequest, ExchangeResponse};

const MISSION_EXCHANGE: &str = "/mission-exchange";
const CHECK_TEST_CASE: &str = "/check-test-case";
const DOWNLOAD_TEST_CASE: &str = "/download-test-case";

/// JSON-over-HTTP coordinator client
#[derive(Clone)]
pub struct HttpCoordinator {
    client: Client,
    base_url: String,
}

impl HttpCoordinator {
    pub fn new(server: &ServerConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        let base_url = server.base_url();

        info!("Coordinator at {}", base_url);

        Ok(Self { client, base_url })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    async fn post_json<Req, Resp>(&self, endpoint: &str, body: &Req) -> Result<Resp, TransportError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = self.url(endpoint);
        let response = self.client.post(&url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status { status, url });
        }
        let bytes = response.bytes().await?;
        debug!("{} answered {} bytes", endpoint, bytes.len());
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl Coordinator for HttpCoordinator {
    async fn exchange(&self, request: &ExchangeRequest) -> Result<ExchangeResponse, TransportError> {
        self.post_json(MISSION_EXCHANGE, request).await
    }

    async fn check_test_cases(&self, request: &CheckRequest) -> Result<CheckResponse, TransportError> {
        self.post_json(CHECK_TEST_CASE, request).await
    }

    async fn download_test_case(&self, pid: i64, filename: &str) -> Result<Vec<u8>, TransportError> {
        let url = self.url(DOWNLOAD_TEST_CASE);
        let response = self
            .client
            .get(&url)
            .query(&[("pid", pid.to_string().as_str()), ("filename", filename)])
            .send()
            .await?;

        // non-success statuses, 404 included, are retried by the caller
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status { status, url });
        }
        Ok(response.bytes().await?.to_vec())
    }
}
