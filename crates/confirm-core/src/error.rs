use thiserror::Error;

/// Core error types for confirmation model operations
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Unknown confirmation type: {0}")]
    UnknownType(String),

    #[error("Unknown confirmation status: {0}")]
    UnknownStatus(String),

    #[error("Invalid confirmation key: {0}")]
    InvalidKey(String),

    #[error("Confirmation has no recipient (userId or email required)")]
    MissingRecipient,

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Context does not match {kind}: {source}")]
    InvalidContext {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl CoreError {
    pub fn unknown_type(value: impl Into<String>) -> Self {
        Self::UnknownType(value.into())
    }

    pub fn unknown_status(value: impl Into<String>) -> Self {
        Self::UnknownStatus(value.into())
    }

    pub fn invalid_key(key: impl Into<String>) -> Self {
        Self::InvalidKey(key.into())
    }

    pub fn invalid_transition(from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn invalid_context(kind: impl Into<String>, source: serde_json::Error) -> Self {
        Self::InvalidContext {
            kind: kind.into(),
            source,
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Check if this error is a client error (4xx category)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownType(_)
                | Self::UnknownStatus(_)
                | Self::InvalidKey(_)
                | Self::MissingRecipient
                | Self::InvalidTransition { .. }
        )
    }

    /// Check if this error is a server error (5xx category)
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }

    /// Get error category for logging/monitoring
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UnknownType(_)
            | Self::UnknownStatus(_)
            | Self::InvalidKey(_)
            | Self::MissingRecipient => ErrorCategory::Validation,
            Self::InvalidTransition { .. } => ErrorCategory::State,
            Self::InvalidContext { .. } | Self::JsonError(_) => ErrorCategory::Serialization,
            Self::Configuration(_) => ErrorCategory::Configuration,
        }
    }
}

/// Error categories for monitoring and classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    State,
    Serialization,
    Configuration,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::State => write!(f, "state"),
            Self::Serialization => write!(f, "serialization"),
            Self::Configuration => write!(f, "configuration"),
        }
    }
}

/// Convenience result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = CoreError::unknown_type("bogus");
        assert_eq!(err.to_string(), "Unknown confirmation type: bogus");
        assert!(err.is_client_error());
        assert!(!err.is_server_error());
        assert_eq!(err.category(), ErrorCategory::Validation);
    }

    #[test]
    fn test_transition_error() {
        let err = CoreError::invalid_transition("completed", "declined");
        assert_eq!(
            err.to_string(),
            "Invalid status transition: completed -> declined"
        );
        assert_eq!(err.category(), ErrorCategory::State);
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err: serde_json::Error =
            serde_json::from_str::<serde_json::Value>("{ invalid json }").unwrap_err();
        let core_err: CoreError = json_err.into();

        assert!(matches!(core_err, CoreError::JsonError(_)));
        assert!(core_err.is_server_error());
        assert_eq!(core_err.category(), ErrorCategory::Serialization);
    }

    #[test]
    fn test_error_categories_display() {
        assert_eq!(ErrorCategory::Validation.to_string(), "validation");
        assert_eq!(ErrorCategory::State.to_string(), "state");
        assert_eq!(ErrorCategory::Serialization.to_string(), "serialization");
        assert_eq!(ErrorCategory::Configuration.to_string(), "configuration");
    }
}
