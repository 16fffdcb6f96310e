//! Error Types
//!
//! `FamilyError` covers every failure the graph engines, codec, storage and
//! synchronization layers can report. Offline recipients are not errors: the
//! hub drops those messages (see `UndeliveredPolicy`).

use crate::models::ValidationError;
use thiserror::Error;

/// Family graph and synchronization errors
#[derive(Error, Debug)]
pub enum FamilyError {
    /// Malformed or incomplete input; nothing was changed
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Target member, account or family does not resolve
    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    /// Request that would break the graph shape (e.g. no relationship targets)
    #[error("Structural error: {0}")]
    Structural(String),

    /// Encoded graph could not be produced or read back
    #[error("Codec error: {0}")]
    Codec(String),

    /// Blob store failure
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Password digest could not be computed or read
    #[error("Credential error: {0}")]
    Credential(String),

    /// Resource already exists (account, family registration)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Message not valid in the current session state
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl FamilyError {
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    pub fn member_not_found(id: impl Into<String>) -> Self {
        Self::not_found("Member", id)
    }

    pub fn account_not_found(email: impl Into<String>) -> Self {
        Self::not_found("Account", email)
    }

    pub fn structural(msg: impl Into<String>) -> Self {
        Self::Structural(msg.into())
    }

    pub fn codec(msg: impl Into<String>) -> Self {
        Self::Codec(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn credential(msg: impl Into<String>) -> Self {
        Self::Credential(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Machine-readable code carried in protocol and HTTP error bodies
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Structural(_) => "STRUCTURAL_ERROR",
            Self::Codec(_) => "CODEC_ERROR",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::Credential(_) => "CREDENTIAL_ERROR",
            Self::Conflict(_) => "CONFLICT",
            Self::Protocol(_) => "PROTOCOL_ERROR",
        }
    }
}

impl From<serde_json::Error> for FamilyError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(format!("JSON serialization error: {}", err))
    }
}

impl From<std::io::Error> for FamilyError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FamilyError>;
