//! Error types for SCHC operations

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Hex decode error: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("No matching rule found")]
    NoRuleMatched,

    #[error("Unknown rule tag {0}")]
    UnknownRuleTag(u8),

    #[error("Truncated buffer: need {needed} bytes, have {available}")]
    TruncatedBuffer { needed: usize, available: usize },

    #[error("Invalid device identity: expected 8 bytes, got {0}")]
    InvalidDeviceIdentity(usize),

    #[error("Rule validation error: {0}")]
    RuleValidation(String),

    #[error("Computed length {0} does not fit in a 16-bit length field")]
    LengthOverflow(usize),

    #[error("Frame of {len} bytes exceeds link MTU of {mtu} and the link cannot fragment")]
    FrameTooLarge { len: usize, mtu: usize },
}

pub type Result<T> = std::result::Result<T, SchcError>;
