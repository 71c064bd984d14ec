//! Errors raised by a tenant reconciliation pass.

use serde::Serialize;
use thiserror::Error;

use crate::rules::SelectorError;
use crate::ruler::RulerError;
use crate::secrets::SecretError;

/// Failure to read from the document pool.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Document pool unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to read document '{document}': {message}")]
    Read { document: String, message: String },

    /// The document exists but its content does not parse.
    #[error("Rule document '{document}' is malformed: {message}")]
    Malformed { document: String, message: String },
}

/// Everything that can abort a pass. Each variant collapses into
/// [`TenantSyncResult::Failed`] at the reconciler boundary.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Invalid label selector: {0}")]
    Selector(#[from] SelectorError),

    #[error("Failed to query rule documents: {0}")]
    PoolAccess(SourceError),

    #[error("Failed to serialize rule document '{document}': {message}")]
    Serialization { document: String, message: String },

    #[error("Failed to resolve credentials: {0}")]
    Credentials(#[from] SecretError),

    #[error("Failed to list remote rule groups: {0}")]
    RemoteList(#[source] RulerError),

    #[error("Remote call for namespace '{namespace}' failed: {source}")]
    RemoteCall {
        namespace: String,
        #[source]
        source: RulerError,
    },

    #[error("Failed to set up ruler client: {0}")]
    Backend(#[source] RulerError),
}

impl From<SourceError> for SyncError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Malformed { document, message } => {
                SyncError::Serialization { document, message }
            }
            other => SyncError::PoolAccess(other),
        }
    }
}

impl SyncError {
    /// True if the next pass may succeed without any change to the configuration.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::PoolAccess(_) => true,
            SyncError::RemoteList(e) | SyncError::RemoteCall { source: e, .. } => {
                e.is_retryable()
            }
            SyncError::Selector(_)
            | SyncError::Serialization { .. }
            | SyncError::Credentials(_)
            | SyncError::Backend(_) => false,
        }
    }

    /// True if the failure points at the tenant's or a document's configuration.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SyncError::Selector(_) | SyncError::Serialization { .. } | SyncError::Credentials(_)
        )
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "reason", rename_all = "camelCase")]
pub enum TenantSyncResult {
    Synced,
    Failed(String),
}

impl TenantSyncResult {
    pub fn is_synced(&self) -> bool {
        matches!(self, TenantSyncResult::Synced)
    }

    /// The failure reason, if any.
    pub fn reason(&self) -> Option<&str> {
        match self {
            TenantSyncResult::Synced => None,
            TenantSyncResult::Failed(reason) => Some(reason),
        }
    }
}

impl<T> From<&Result<T>> for TenantSyncResult {
    fn from(result: &Result<T>) -> Self {
        match result {
            Ok(_) => TenantSyncResult::Synced,
            Err(e) => TenantSyncResult::Failed(e.to_string()),
        }
    }
}
