//! Error taxonomy shared by both services and the protocol client

use thiserror::Error;

/// Failure reported to a peer inside the response envelope
///
/// Every fault that happens while serving one connection is converted into
/// one of these variants at the connection boundary. The wire form is the
/// `error` code string plus optional `details`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// Request bytes were not a JSON object
    #[error("invalid_request_format")]
    InvalidRequestFormat,
    /// Action-specific fields were missing or had the wrong type
    #[error("invalid_params: {0}")]
    InvalidParams(String),
    /// No record exists for the requested user id
    #[error("user_not_found")]
    UserNotFound,
    /// Missing, non-string or unsupported `action`
    #[error("unknown_action")]
    UnknownAction,
    /// Request frame exceeded the configured size limit
    #[error("frame_too_large: limit is {0} bytes")]
    FrameTooLarge(usize),
    /// Peer did not finish sending its request in time
    #[error("request_timeout")]
    RequestTimeout,
    /// All handler slots are taken
    #[error("server_busy")]
    ServerBusy,
    /// Unexpected internal fault
    #[error("server_error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Stable error code written to the `error` field
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::InvalidRequestFormat => "invalid_request_format",
            ServiceError::InvalidParams(_) => "invalid_params",
            ServiceError::UserNotFound => "user_not_found",
            ServiceError::UnknownAction => "unknown_action",
            ServiceError::FrameTooLarge(_) => "frame_too_large",
            ServiceError::RequestTimeout => "request_timeout",
            ServiceError::ServerBusy => "server_busy",
            ServiceError::Internal(_) => "server_error",
        }
    }

    /// Short diagnostic written to the `details` field, if any
    pub fn details(&self) -> Option<String> {
        match self {
            ServiceError::InvalidParams(reason) | ServiceError::Internal(reason) => {
                Some(reason.clone())
            }
            ServiceError::FrameTooLarge(limit) => Some(format!("limit is {} bytes", limit)),
            _ => None,
        }
    }
}

/// Failure while reading one newline-terminated frame
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame exceeds {limit} bytes")]
    TooLarge { limit: usize },
    #[error("timed out waiting for frame")]
    TimedOut,
    #[error("frame encode: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("frame io: {0}")]
    Io(#[from] std::io::Error),
}

impl From<FrameError> for ServiceError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::TooLarge { limit } => ServiceError::FrameTooLarge(limit),
            FrameError::TimedOut => ServiceError::RequestTimeout,
            FrameError::Encode(e) => ServiceError::Internal(e.to_string()),
            FrameError::Io(e) => ServiceError::Internal(e.to_string()),
        }
    }
}
