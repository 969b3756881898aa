//! Error types for dirbridge

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DirBridgeError {
    /// The mapping settings cannot drive a sync or export, e.g. no `username`
    /// attribute survives filtering.
    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Directory unavailable: {message}")]
    DirectoryUnavailable { message: String },

    #[error("Malformed directory entry {dn}: {message}")]
    MalformedEntry { dn: String, message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Sync failed while {state}: {message}")]
    SyncFailed { state: String, message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DirBridgeError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError {
            message: message.into(),
        }
    }

    pub fn directory_unavailable(message: impl Into<String>) -> Self {
        Self::DirectoryUnavailable {
            message: message.into(),
        }
    }

    pub fn malformed_entry(dn: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedEntry {
            dn: dn.into(),
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn sync_failed(state: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SyncFailed {
            state: state.into(),
            message: message.into(),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the error came from the directory collaborator rather than
    /// from local configuration or data.
    pub fn is_directory_failure(&self) -> bool {
        matches!(self, Self::DirectoryUnavailable { .. })
    }
}

pub type Result<T> = std::result::Result<T, DirBridgeError>;
