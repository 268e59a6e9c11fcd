use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("payload of {0} bytes exceeds the {mtu} byte MTU", mtu = crate::MTU)]
    PayloadTooLarge(usize),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
