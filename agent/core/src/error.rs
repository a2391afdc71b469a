use thiserror::Error;

/// Top-level error type for the docagent runtime.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("capture device not found: {0}")]
    DeviceUnavailable(String),

    #[error("device driver error: {0}")]
    DriverError(String),

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("listener is running; stop it before changing the port")]
    ListenerRunning,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
