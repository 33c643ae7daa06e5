use config::ConfigError;
use serde_json::Error as SerdeJsonError;
use std::io::Error as IoError;
use thiserror::Error;
use tokio::task::JoinError;

pub type BridgeResult<T, E = BridgeError> = Result<T, E>;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("invalid topic descriptions: {0}")]
    Validation(String),
    #[error("mqtt client not connected")]
    NotConnected,
    #[error("mqtt error: {0}")]
    Mqtt(String),
    #[error("platform error: {0}")]
    Platform(String),
    #[error("device repository error: {0}")]
    Repository(String),
    #[error("payload transformation failed: {0}")]
    Transform(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("initialization error: {0}")]
    Init(String),
    #[error("{0}")]
    Msg(String),
    #[error("{0}")]
    ConfigError(#[from] ConfigError),
    #[error("{0}")]
    Json(#[from] SerdeJsonError),
    #[error("{0}")]
    IoError(#[from] IoError),
    #[error("{0}")]
    JoinError(#[from] JoinError),
    #[error("{0}")]
    Http(#[from] reqwest::Error),
}

impl From<String> for BridgeError {
    #[inline]
    fn from(e: String) -> Self {
        BridgeError::Msg(e)
    }
}

impl From<&str> for BridgeError {
    #[inline]
    fn from(e: &str) -> Self {
        BridgeError::Msg(e.to_string())
    }
}
