use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid address {address}: {message}")]
    InvalidAddress { address: String, message: String },

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error(transparent)]
    Render(#[from] RenderError),
}

impl NotificationError {
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub fn parse(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn invalid_address(address: impl Into<String>, message: impl ToString) -> Self {
        Self::InvalidAddress {
            address: address.into(),
            message: message.to_string(),
        }
    }
}

/// Failure to produce a subject/body pair from a template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("Cannot find translation for item {key} in locale {locale}")]
    MissingTranslation { key: String, locale: String },

    #[error("Template {template} has no value for {{{{{name}}}}}")]
    MissingValue { template: String, name: String },

    #[error("Template not found: {0}")]
    TemplateNotFound(String),
}

impl RenderError {
    /// The visible stand-in for a missing translation, for callers that
    /// render on regardless.
    #[must_use]
    pub fn placeholder(&self) -> Option<String> {
        match self {
            Self::MissingTranslation { key, .. } => {
                Some(format!("<< Cannot find translation for item {key} >>"))
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn is_missing_translation(&self) -> bool {
        matches!(self, Self::MissingTranslation { .. })
    }
}

pub type Result<T> = std::result::Result<T, NotificationError>;
