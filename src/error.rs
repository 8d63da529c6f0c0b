//! Application-wide error types.

use thiserror::Error;

use crate::agent::backends::BackendError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("agent error: {0}")]
    Agent(#[from] BackendError),

    #[error("comms error: {0}")]
    Comms(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
