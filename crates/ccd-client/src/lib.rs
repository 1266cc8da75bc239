//! Client abstraction over the camera-control HTTP server.

mod http;

use std::{collections::VecDeque, sync::Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ccd_types::{
    api::CameraCommand,
    CcdError, Result,
};
use serde_json::json;
use tokio::time::{sleep, Duration};
use tracing::info;

pub use http::HttpCamera;

/// Aggregated request counters.
#[derive(Debug, Default, Clone)]
pub struct ClientMetrics {
    pub last_latency_ms: Option<u64>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub successful_requests: u64,
    pub failed_requests: u64,
}

#[async_trait]
pub trait CameraApi: Send + Sync {
    /// Raw `/getData` body. Parsing is left to the caller.
    async fn fetch_status(&self) -> Result<String>;
    async fn send(&self, command: CameraCommand) -> Result<()>;
    fn base_url(&self) -> &str;
    fn metrics(&self) -> ClientMetrics;
}

/// In-memory camera used for tests and the offline demo mode.
///
/// Status bodies are served from a script; once the script is exhausted the
/// last body is repeated.
pub struct MockCamera {
    script: Mutex<VecDeque<Result<String>>>,
    last_body: Mutex<String>,
    sent: Mutex<Vec<CameraCommand>>,
    fail_commands: bool,
    latency: Duration,
    metrics: Mutex<ClientMetrics>,
}

impl MockCamera {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            last_body: Mutex::new(default_status_body()),
            sent: Mutex::new(Vec::new()),
            fail_commands: false,
            latency: Duration::from_millis(0),
            metrics: Mutex::new(ClientMetrics::default()),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn failing_commands(mut self) -> Self {
        self.fail_commands = true;
        self
    }

    pub fn push_status(&self, body: impl Into<String>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Ok(body.into()));
        }
    }

    pub fn push_failure(&self, message: impl Into<String>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Err(CcdError::Transport(message.into())));
        }
    }

    /// Commands received so far, in arrival order.
    pub fn sent_commands(&self) -> Vec<CameraCommand> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn record(&self, ok: bool) {
        if let Ok(mut metrics) = self.metrics.lock() {
            if ok {
                metrics.successful_requests += 1;
                metrics.last_success_at = Some(Utc::now());
                metrics.last_latency_ms = Some(self.latency.as_millis() as u64);
            } else {
                metrics.failed_requests += 1;
            }
        }
    }
}

impl Default for MockCamera {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CameraApi for MockCamera {
    async fn fetch_status(&self) -> Result<String> {
        if !self.latency.is_zero() {
            sleep(self.latency).await;
        }
        let next = self
            .script
            .lock()
            .map_err(|_| client_error("mock script lock poisoned"))?
            .pop_front();
        let result = match next {
            Some(Ok(body)) => {
                if let Ok(mut last) = self.last_body.lock() {
                    *last = body.clone();
                }
                Ok(body)
            }
            Some(Err(err)) => Err(err),
            None => self
                .last_body
                .lock()
                .map(|b| b.clone())
                .map_err(|_| client_error("mock body lock poisoned")),
        };
        self.record(result.is_ok());
        result
    }

    async fn send(&self, command: CameraCommand) -> Result<()> {
        info!("Mock camera received {}", command.path());
        if !self.latency.is_zero() {
            sleep(self.latency).await;
        }
        self.sent
            .lock()
            .map_err(|_| client_error("mock command log poisoned"))?
            .push(command.clone());
        if self.fail_commands {
            self.record(false);
            return Err(command_error(&command, "mock camera rejects commands"));
        }
        self.record(true);
        Ok(())
    }

    fn base_url(&self) -> &str {
        "http://mock-camera"
    }

    fn metrics(&self) -> ClientMetrics {
        self.metrics.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

fn default_status_body() -> String {
    json!({
        "statusVal": 0,
        "errorState": 0,
        "msg": "mock camera",
        "cameraId": "CCD Simulator",
        "coolerOn": false,
    })
    .to_string()
}

/// Generate an error aligned with transport semantics.
pub fn client_error(message: impl Into<String>) -> CcdError {
    CcdError::Transport(message.into())
}

pub fn command_error(command: &CameraCommand, message: impl std::fmt::Display) -> CcdError {
    CcdError::Command(format!("{} failed: {message}", command.path()))
}
