use thiserror::Error;

/// Failure of a request to the scoring service. `Display` is the message
/// shown to the respondent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// 4xx, or a body carrying a 4xx status. Never retried.
    #[error("{message}")]
    Client { status: u16, message: String },
    #[error("{message}")]
    Server { status: u16, message: String },
    #[error("{0}")]
    Network(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("invalid service url: {0}")]
    InvalidUrl(String),
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::Server { .. }
                | TransportError::Network(_)
                | TransportError::Malformed(_)
        )
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Client { status, .. } | TransportError::Server { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }
}
