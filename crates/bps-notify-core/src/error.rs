//! Error types shared by the poller, the backend client and the settings store.

use thiserror::Error;

/// Errors returned by poller control operations.
///
/// Fetch failures never show up here: they are cycle-scoped and reported
/// through the sink's diagnostic hook instead.
#[derive(Debug, Error)]
pub enum PollerError {
    #[error("invalid poller configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to persist notification settings: {0}")]
    Settings(#[from] SettingsError),
}

/// Failure of a single request to the notification service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("server responded with status {status}")]
    Server { status: u16 },

    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

impl FetchError {
    /// Diagnostic classification handed to `on_fetch_error`.
    ///
    /// A malformed payload is reported as a server error without a status.
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            Self::Network(_) => FetchErrorKind::Network,
            Self::Server { status } => FetchErrorKind::Server {
                status: Some(*status),
            },
            Self::MalformedPayload(_) => FetchErrorKind::Server { status: None },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchErrorKind {
    Network,
    Server { status: Option<u16> },
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings format error: {0}")]
    Format(#[from] serde_json::Error),
}
