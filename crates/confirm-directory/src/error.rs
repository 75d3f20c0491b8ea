use thiserror::Error;

/// Failure of a call into a peer directory service.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("{service}: not found: {what}")]
    NotFound { service: &'static str, what: String },

    #[error("{service}: unavailable: {message}")]
    Unavailable {
        service: &'static str,
        message: String,
    },

    /// The peer answered with a client error other than 404.
    #[error("{service}: rejected with status {status}: {message}")]
    Rejected {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("{service}: invalid response: {message}")]
    InvalidResponse {
        service: &'static str,
        message: String,
    },
}

impl DirectoryError {
    #[must_use]
    pub fn not_found(service: &'static str, what: impl Into<String>) -> Self {
        Self::NotFound {
            service,
            what: what.into(),
        }
    }

    #[must_use]
    pub fn unavailable(service: &'static str, message: impl Into<String>) -> Self {
        Self::Unavailable {
            service,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn rejected(service: &'static str, status: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            service,
            status,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn invalid_response(service: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            service,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn service(&self) -> &'static str {
        match self {
            Self::NotFound { service, .. }
            | Self::Unavailable { service, .. }
            | Self::Rejected { service, .. }
            | Self::InvalidResponse { service, .. } => service,
        }
    }
}

pub type Result<T> = std::result::Result<T, DirectoryError>;

/// Turns a `NotFound` into `Ok(None)`.
pub trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for Result<T> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}
