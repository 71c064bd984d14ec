use thiserror::Error;

pub use crate::gitops::error::ConfigError;
pub use crate::ruler::RulerError;
pub use crate::secrets::SecretError;
pub use crate::sync::SyncError;

#[derive(Error, Debug)]
pub enum RulesyncError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Ruler error: {0}")]
    Ruler(#[from] RulerError),

    #[error("Secret error: {0}")]
    Secret(#[from] SecretError),
}

impl RulesyncError {
    /// True if retrying later may succeed without a configuration change.
    pub fn is_retryable(&self) -> bool {
        match self {
            RulesyncError::Sync(e) => e.is_retryable(),
            RulesyncError::Ruler(e) => e.is_retryable(),
            RulesyncError::Config(_) | RulesyncError::Secret(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, RulesyncError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_wraps_with_context() {
        let err = RulesyncError::from(ConfigError::ConfigDirNotFound(PathBuf::from("/etc/rulesync")));
        assert_eq!(
            err.to_string(),
            "Configuration error: Config directory not found: /etc/rulesync"
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_retryable_follows_source() {
        let err = RulesyncError::from(RulerError::Timeout(30));
        assert!(err.is_retryable());

        let err = RulesyncError::from(SyncError::from(SecretError::InvalidName("..".to_string())));
        assert!(!err.is_retryable());
    }
}
