use thiserror::Error;

#[derive(Debug, Error)]
pub enum NanatechError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("store error: {0}")]
    Store(String),
    #[error("alert error: {0}")]
    Alert(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("runtime error: {0}")]
    Runtime(String),
}

pub use crate::Result;
