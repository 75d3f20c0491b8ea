//! Engine failures and their HTTP rendering.

use axum::http::StatusCode;
use confirm_api::ApiError;
use confirm_core::CoreError;
use confirm_directory::DirectoryError;
use confirm_notifications::NotificationError;
use confirm_storage::StorageError;
use thiserror::Error;

/// Why a sign-up claim was refused. Rendered as 409 with `error` set to the code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimError {
    /// The account has no password and the claim carried no body.
    PasswordNeeded,
    PasswordMissing,
    PasswordInvalid,
    BirthdayMissing,
    BirthdayInvalid,
    BirthdayMismatch,
}

impl ClaimError {
    pub fn code(&self) -> u32 {
        match self {
            Self::PasswordNeeded => 1001,
            Self::PasswordMissing => 1002,
            Self::PasswordInvalid => 1003,
            Self::BirthdayMissing => 1004,
            Self::BirthdayInvalid => 1005,
            Self::BirthdayMismatch => 1006,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::PasswordNeeded => "User does not have a password",
            Self::PasswordMissing => "Password is missing",
            Self::PasswordInvalid => "Password specified is invalid",
            Self::BirthdayMissing => "Birthday is missing",
            Self::BirthdayInvalid => "Birthday specified is invalid",
            Self::BirthdayMismatch => "Birthday specified does not match patient birthday",
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    /// The invitee's account kind does not fit the requested role.
    #[error("{0}")]
    RoleConflict(String),

    #[error("{0}")]
    Conflict(String),

    #[error("confirmation has expired")]
    Expired,

    #[error("not modified")]
    NotModified,

    #[error("too many attempts")]
    TooManyAttempts,

    /// The record was persisted but its email could not be delivered.
    #[error("mail dispatch failed: {0}")]
    Mail(String),

    #[error("{}", .0.reason())]
    Claim(ClaimError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error("{0}")]
    Internal(String),
}

impl EngineError {
    #[must_use]
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    #[must_use]
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    #[must_use]
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    #[must_use]
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    #[must_use]
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    #[must_use]
    pub fn existing_invite() -> Self {
        Self::Conflict("an invitation is already pending".into())
    }

    #[must_use]
    pub fn existing_member() -> Self {
        Self::Conflict("already a member".into())
    }

    /// A required side effect in a peer directory failed.
    #[must_use]
    pub fn side_effect(what: &str, source: DirectoryError) -> Self {
        Self::Internal(format!("{what} failed: {source}"))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) | Self::TooManyAttempts => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::RoleConflict(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::Conflict(_) | Self::Expired | Self::Claim(_) => StatusCode::CONFLICT,
            Self::NotModified => StatusCode::NOT_MODIFIED,
            Self::Mail(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Directory(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            Self::Storage(_) | Self::Directory(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<CoreError> for EngineError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidTransition { .. } => Self::Forbidden(e.to_string()),
            e if e.is_client_error() => Self::BadRequest(e.to_string()),
            e => Self::Internal(e.to_string()),
        }
    }
}

impl From<NotificationError> for EngineError {
    fn from(e: NotificationError) -> Self {
        Self::Mail(e.to_string())
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::BadRequest(m) => ApiError::bad_request(m),
            EngineError::Unauthorized(m) => ApiError::unauthorized(m),
            EngineError::Forbidden(m) => ApiError::forbidden(m),
            EngineError::NotFound(m) => ApiError::not_found(m),
            EngineError::RoleConflict(m) => ApiError::method_not_allowed(m),
            EngineError::Conflict(m) => ApiError::conflict(m),
            EngineError::NotModified => ApiError::NotModified,
            EngineError::Claim(c) => ApiError::coded(StatusCode::CONFLICT, c.code(), c.reason()),
            EngineError::Mail(m) => ApiError::unprocessable_entity(m),
            EngineError::Directory(d) if d.is_not_found() => ApiError::not_found(d.to_string()),
            e @ EngineError::Expired => ApiError::conflict(e.to_string()),
            e @ EngineError::TooManyAttempts => ApiError::forbidden(e.to_string()),
            e @ (EngineError::Storage(_) | EngineError::Directory(_) | EngineError::Internal(_)) => {
                tracing::error!(error = %e, "Request failed");
                ApiError::internal(e.to_string())
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
