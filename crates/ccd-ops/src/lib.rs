//! Operational helpers: logging and poll statistics.

use std::{
    fs::{File, OpenOptions},
    path::PathBuf,
    sync::{Arc, Mutex as StdMutex},
};

use ccd_types::{config::OpsConfig, CcdError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_FILE_NAME: &str = "ccd-dash.log";

/// Installs the global subscriber, appending to `<log_dir>/ccd-dash.log`.
///
/// Output goes to a file so that it never interleaves with the terminal UI.
pub fn init_tracing(config: &OpsConfig) -> Result<PathBuf> {
    let filter = EnvFilter::try_new(config.log_level.clone())
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|err| CcdError::Ops(format!("failed to create log filter: {err}")))?;

    let dir = ensure_log_dir(&config.log_dir)?;
    let path = dir.join(LOG_FILE_NAME);
    let file: File = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|err| CcdError::Ops(format!("failed to open log file {:?}: {err}", path)))?;

    fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(StdMutex::new(file))
        .try_init()
        .map_err(|err| CcdError::Ops(format!("tracing init error: {err}")))?;
    info!("Logging to {:?}", path);
    Ok(path)
}

pub fn ensure_log_dir(path: &str) -> Result<PathBuf> {
    let dir = PathBuf::from(path);
    std::fs::create_dir_all(&dir)
        .map_err(|err| CcdError::Ops(format!("failed to create log dir: {err}")))?;
    Ok(dir)
}

/// Counters describing how poll ticks were resolved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PollCounters {
    pub ticks: u64,
    pub applied: u64,
    /// Bodies that could not be parsed as a snapshot.
    pub dropped: u64,
    pub failed: u64,
    /// Responses older than one already applied.
    pub stale: u64,
    pub consecutive_failures: u32,
    pub last_applied_at: Option<DateTime<Utc>>,
}

/// Shared poll statistics, written by the poller and the sync loop.
#[derive(Clone, Default)]
pub struct PollStats {
    counters: Arc<Mutex<PollCounters>>,
}

impl PollStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_tick(&self) {
        self.counters.lock().await.ticks += 1;
    }

    pub async fn record_applied(&self) {
        let mut counters = self.counters.lock().await;
        counters.applied += 1;
        counters.consecutive_failures = 0;
        counters.last_applied_at = Some(Utc::now());
    }

    pub async fn record_dropped(&self) {
        // The server answered, so the connection itself is fine.
        let mut counters = self.counters.lock().await;
        counters.dropped += 1;
        counters.consecutive_failures = 0;
    }

    /// Returns the number of consecutive failures including this one.
    pub async fn record_failed(&self) -> u32 {
        let mut counters = self.counters.lock().await;
        counters.failed += 1;
        counters.consecutive_failures = counters.consecutive_failures.saturating_add(1);
        counters.consecutive_failures
    }

    pub async fn record_stale(&self) {
        self.counters.lock().await.stale += 1;
    }

    pub async fn snapshot(&self) -> PollCounters {
        self.counters.lock().await.clone()
    }
}
