use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("uart error: {0}")]
    Uart(String),
    #[error("device link disconnected")]
    Disconnected,
    #[error("unknown device command: {0}")]
    UnknownCommand(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl HwError {
    /// Classify an I/O error, folding the ways a serial link dies into
    /// `Disconnected`.
    pub fn from_io(e: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match e.kind() {
            ErrorKind::BrokenPipe
            | ErrorKind::NotConnected
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::UnexpectedEof => Self::Disconnected,
            _ => Self::Io(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, HwError>;
