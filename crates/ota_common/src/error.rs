//! Error types for otad.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, OtaError>;

#[derive(Error, Debug)]
pub enum OtaError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Device error: {0}")]
    Device(String),

    #[error("Boot environment error: {0}")]
    BootEnv(String),

    #[error("No update in progress, nothing to commit")]
    NoUpdateInProgress,

    #[error("An installed update is waiting for reboot and commit")]
    UpdatePending,

    #[error("Daemon loop is already running")]
    AlreadyRunning,

    #[error("Daemon task failed: {0}")]
    Task(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl OtaError {
    /// True for errors raised by the server exchange rather than the device.
    pub fn is_network(&self) -> bool {
        matches!(self, OtaError::Transport(_) | OtaError::Protocol(_))
    }
}
