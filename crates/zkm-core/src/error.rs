use thiserror::Error;

pub type ZkmResult<T> = Result<T, ZkmError>;

#[derive(Debug, Error)]
pub enum ZkmError {
    #[error("config error: {0}")]
    Config(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid epoch: {0}")]
    InvalidEpoch(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
