use thiserror::Error;

#[derive(Debug, Error)]
pub enum AirsenseError {
    #[error("invalid sensor frame")]
    InvalidFrame,
    #[error("sensor frame checksum mismatch")]
    ChecksumMismatch,
    #[error("timed out waiting for a complete sensor sample")]
    SensorTimeout,
    #[error("sensor stream ended")]
    SensorGone,
    #[error("listener already started")]
    ListenerAlreadyStarted,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),
    #[error("D-Bus error: {0}")]
    DBus(#[from] zbus::Error),
}

pub type Result<T> = std::result::Result<T, AirsenseError>;
