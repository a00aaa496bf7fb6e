use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FeederError {
    #[error("device link error: {0}")]
    Link(String),
    #[error("device link disconnected")]
    Disconnected,
    #[error("command store error: {0}")]
    Store(String),
    #[error("detection source error: {0}")]
    Detection(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid state: {0}")]
    State(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("missing command sink")]
    MissingSink,
    #[error("missing command store")]
    MissingStore,
    #[error("missing detection source")]
    MissingDetection,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
