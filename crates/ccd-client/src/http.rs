use std::{sync::Mutex, time::Instant};

use async_trait::async_trait;
use ccd_types::{api::CameraCommand, config::CameraConfig, Result};
use chrono::Utc;
use reqwest::{Client, Method};
use tokio::time::Duration;

use crate::{client_error, command_error, CameraApi, ClientMetrics};

/// Camera client talking to the real control server over HTTP.
pub struct HttpCamera {
    http: Client,
    base_url: String,
    metrics: Mutex<ClientMetrics>,
}

impl HttpCamera {
    pub fn new(config: &CameraConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|err| client_error(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            metrics: Mutex::new(ClientMetrics::default()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn request(&self, method: Method, path: &str) -> Result<String> {
        let start = Instant::now();
        let result = self.execute(method.clone(), path).await;
        match &result {
            Ok(_) => self.record_success(start),
            Err(err) => {
                tracing::debug!("{} {} failed: {}", method, path, err);
                self.record_failure();
            }
        }
        result
    }

    async fn execute(&self, method: Method, path: &str) -> Result<String> {
        let response = self
            .http
            .request(method.clone(), self.url(path))
            .send()
            .await
            .map_err(|err| client_error(format!("{method} {path} request failed: {err}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| client_error(format!("{method} {path} body read failed: {err}")))?;
        if !status.is_success() {
            return Err(client_error(format!(
                "{method} {path} returned HTTP {status}: {}",
                body.trim()
            )));
        }
        Ok(body)
    }

    fn record_success(&self, start: Instant) {
        if let Ok(mut guard) = self.metrics.lock() {
            guard.last_latency_ms = Some(start.elapsed().as_millis() as u64);
            guard.last_success_at = Some(Utc::now());
            guard.successful_requests += 1;
        }
    }

    fn record_failure(&self) {
        if let Ok(mut guard) = self.metrics.lock() {
            guard.failed_requests += 1;
        }
    }
}

#[async_trait]
impl CameraApi for HttpCamera {
    async fn fetch_status(&self) -> Result<String> {
        self.request(Method::GET, "/getData").await
    }

    async fn send(&self, command: CameraCommand) -> Result<()> {
        let path = command.path();
        self.request(Method::POST, &path)
            .await
            .map(|_| ())
            .map_err(|err| command_error(&command, err))
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn metrics(&self) -> ClientMetrics {
        self.metrics.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccd_types::api::ImageEndpoint;

    #[test]
    fn trailing_slash_is_trimmed() {
        let camera = HttpCamera::new(&CameraConfig {
            base_url: "http://camera.local:8081/".into(),
            request_timeout_ms: 1_000,
        })
        .expect("build client");
        assert_eq!(camera.url("/getData"), "http://camera.local:8081/getData");
        assert_eq!(
            ImageEndpoint::Preview.url(camera.base_url(), 42),
            "http://camera.local:8081/getImage?42"
        );
    }

    #[tokio::test]
    async fn unreachable_server_is_a_transport_error() {
        let camera = HttpCamera::new(&CameraConfig {
            base_url: "http://127.0.0.1:9".into(),
            request_timeout_ms: 500,
        })
        .expect("build client");
        assert!(camera.fetch_status().await.is_err());
        assert_eq!(camera.metrics().failed_requests, 1);
    }
}
