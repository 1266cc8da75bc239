use thiserror::Error;

pub type Result<T, E = CcdError> = std::result::Result<T, E>;

/// Unified error type covering the failure scenarios of the dashboard.
#[derive(Debug, Error)]
pub enum CcdError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed status payload: {0}")]
    Payload(String),
    #[error("command error: {0}")]
    Command(String),
    #[error("sync loop error: {0}")]
    Sync(String),
    #[error("operational error: {0}")]
    Ops(String),
}
