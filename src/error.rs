use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    InvalidVolume,
    StockExhausted,
    NotFound,
    NoTip,
    TipAlreadyMounted,
    InvalidInput,
    Io,
    Hardware,
    Internal,
}

/// Every failure in the orchestration core is fatal to the run: liquid that
/// has already moved cannot be put back, so nothing here is retried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{code:?}: {message}")]
pub struct ProtocolError {
    pub code: ErrorCode,
    pub message: String,
}

impl ProtocolError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_volume(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidVolume, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }
}

impl From<std::io::Error> for ProtocolError {
    fn from(err: std::io::Error) -> Self {
        Self::new(ErrorCode::Io, err.to_string())
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(ErrorCode::InvalidInput, err.to_string())
    }
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_code() {
        let err = ProtocolError::invalid_volume("volume must be between 0 and 250");
        assert_eq!(
            err.to_string(),
            "InvalidVolume: volume must be between 0 and 250"
        );
    }

    #[test]
    fn test_serde_error_is_invalid_input() {
        let err: ProtocolError = serde_json::from_str::<u32>("x").unwrap_err().into();
        assert_eq!(err.code, ErrorCode::InvalidInput);
    }
}
