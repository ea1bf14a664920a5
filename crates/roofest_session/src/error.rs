//! Error types for the session state machine.

use std::time::Duration;

use thiserror::Error;

use crate::types::SessionStatus;

/// Result type alias for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Result type alias for Estimation Service calls.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Failures reported by an Estimation Service implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// The request never produced a response (connect, DNS, reset, ...).
    #[error("Transport failure: {0}")]
    Transport(String),

    /// The service answered with a non-success status.
    #[error("Service returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The response does not match the expected contract.
    #[error("Protocol violation: {0}")]
    Protocol(String),
}

impl ServiceError {
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }
}

/// An operation was invoked against a session state that does not allow it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("{operation} rejected: another service call is in flight")]
    Busy { operation: &'static str },

    #[error("{operation} requires status {expected:?}, current status is {current:?}")]
    WrongStatus {
        operation: &'static str,
        current: SessionStatus,
        expected: SessionStatus,
    },

    #[error("no session has been started")]
    NoSession,

    #[error("no question is pending an answer")]
    NoPendingQuestion,

    #[error("a final estimate is already recorded for this session")]
    FinalAlreadySet,

    #[error("no final estimate has been recorded")]
    NoFinalEstimate,

    #[error("the lead for this session has already been submitted")]
    LeadAlreadySubmitted,
}

/// Coarse classification used by the rendering layer for notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    Protocol,
    State,
    Validation,
}

/// Errors surfaced by the session controller and its components.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("Estimation Service did not answer within {0:?}")]
    Timeout(Duration),

    /// An estimate range broke `0 <= min <= max`. The service breached its
    /// contract; the session should be reset.
    #[error("Data integrity violation: {0}")]
    Integrity(String),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("Invalid input: {0}")]
    Validation(String),

    /// The session was reset while the call was in flight; its response
    /// was discarded.
    #[error("response for {operation} discarded: session was reset")]
    Superseded { operation: &'static str },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Service(ServiceError::Protocol(_)) | Self::Integrity(_) => ErrorKind::Protocol,
            Self::Service(_) | Self::Timeout(_) => ErrorKind::Network,
            Self::State(_) | Self::Superseded { .. } => ErrorKind::State,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Serialization(_) => ErrorKind::Protocol,
        }
    }

    /// Whether repeating the identical action may succeed.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Service(_) | Self::Timeout(_))
    }

    /// Whether the session can no longer be trusted and should be reset.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Integrity(_))
    }
}
