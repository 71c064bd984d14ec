//! Secret lookup for tenant credentials.
//!
//! Tenants never embed secret material in their `secretRef`s; they name a
//! secret and the engine reads the value at the start of each pass. The
//! default store follows the Kubernetes mounted-secret layout:
//!
//! ```text
//! <secretsDir>/<secret-name>/<key>
//! ```
//!
//! so a `Secret` mounted as a volume works without any adapter.

use secrecy::SecretString;
use std::fs;
use std::path::{Path, PathBuf};

/// Error type for secret resolution failures.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("Secret '{name}' has no key '{key}'")]
    NotFound { name: String, key: String },

    #[error("Failed to read secret from file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Secret '{name}' key '{key}' is empty")]
    Empty { name: String, key: String },

    #[error("Invalid secret reference '{0}'")]
    InvalidName(String),
}

/// Result type for secret resolution.
pub type Result<T> = std::result::Result<T, SecretError>;

/// A source of named secrets, each holding one or more keys.
pub trait SecretStore: Send + Sync {
    /// Returns the value stored under `key` in secret `name`.
    fn get(&self, name: &str, key: &str) -> Result<SecretString>;
}

/// Reads secrets from a directory tree of mounted secret volumes.
#[derive(Debug, Clone)]
pub struct MountedSecretStore {
    root: PathBuf,
}

impl MountedSecretStore {
    /// Creates a store rooted at `root`. A leading `~` is expanded.
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_string_lossy();
        Self {
            root: PathBuf::from(expand_home(&root)),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl SecretStore for MountedSecretStore {
    fn get(&self, name: &str, key: &str) -> Result<SecretString> {
        validate_segment(name)?;
        validate_segment(key)?;

        let path = self.root.join(name).join(key);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SecretError::NotFound {
                    name: name.to_string(),
                    key: key.to_string(),
                })
            }
            Err(e) => {
                return Err(SecretError::FileReadError {
                    path: path.display().to_string(),
                    source: e,
                })
            }
        };

        // Mounted files and hand-written ones usually carry a trailing newline
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(SecretError::Empty {
                name: name.to_string(),
                key: key.to_string(),
            });
        }
        Ok(SecretString::from(trimmed.to_string()))
    }
}

/// A secret name or key must be a single path component.
fn validate_segment(segment: &str) -> Result<()> {
    if segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains('/')
        || segment.contains('\\')
    {
        return Err(SecretError::InvalidName(segment.to_string()));
    }
    Ok(())
}

/// Expands `~` to the user's home directory.
///
/// Works cross-platform: checks HOME (Unix) then USERPROFILE (Windows).
/// Handles both `~/path` and standalone `~`; `~user/path` is left untouched.
pub fn expand_home(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            if path == "~" {
                return home.to_string_lossy().into_owned();
            }
            return path.replacen("~", &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serial_test::serial;
    use tempfile::TempDir;

    fn store_with(name: &str, key: &str, value: &str) -> (TempDir, MountedSecretStore) {
        let dir = TempDir::new().unwrap();
        let secret_dir = dir.path().join(name);
        fs::create_dir_all(&secret_dir).unwrap();
        fs::write(secret_dir.join(key), value).unwrap();
        let store = MountedSecretStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn test_reads_mounted_secret() {
        let (_dir, store) = store_with("mimir-auth", "token", "s3cr3t");
        let secret = store.get("mimir-auth", "token").unwrap();
        assert_eq!(secret.expose_secret(), "s3cr3t");
    }

    #[test]
    fn test_file_content_trimmed() {
        let (_dir, store) = store_with("mimir-auth", "key", "  api-key-value \n");
        let secret = store.get("mimir-auth", "key").unwrap();
        assert_eq!(secret.expose_secret(), "api-key-value");
    }

    #[test]
    fn test_missing_key_is_not_found() {
        let (_dir, store) = store_with("mimir-auth", "token", "s3cr3t");
        assert!(matches!(
            store.get("mimir-auth", "key"),
            Err(SecretError::NotFound { .. })
        ));
        assert!(matches!(
            store.get("other", "token"),
            Err(SecretError::NotFound { .. })
        ));
    }

    #[test]
    fn test_whitespace_only_secret_is_empty() {
        let (_dir, store) = store_with("mimir-auth", "token", "\n\n");
        assert!(matches!(
            store.get("mimir-auth", "token"),
            Err(SecretError::Empty { .. })
        ));
    }

    #[test]
    fn test_rejects_path_traversal() {
        let (_dir, store) = store_with("mimir-auth", "token", "s3cr3t");
        assert!(matches!(
            store.get("../mimir-auth", "token"),
            Err(SecretError::InvalidName(_))
        ));
        assert!(matches!(
            store.get("mimir-auth", ".."),
            Err(SecretError::InvalidName(_))
        ));
        assert!(matches!(store.get("", "token"), Err(SecretError::InvalidName(_))));
    }

    #[test]
    #[serial]
    fn test_expand_home() {
        assert_eq!(expand_home("/absolute/path"), "/absolute/path");
        assert_eq!(expand_home("relative/path"), "relative/path");
        assert_eq!(expand_home("~alice/secrets"), "~alice/secrets");

        if let Ok(home) = std::env::var("HOME") {
            assert_eq!(expand_home("~/test"), format!("{}/test", home));
            assert_eq!(expand_home("~"), home);
        }
    }

    #[test]
    #[serial]
    fn test_store_root_expands_home() {
        let dir = TempDir::new().unwrap();
        let previous = std::env::var_os("HOME");
        std::env::set_var("HOME", dir.path());

        let store = MountedSecretStore::new("~/secrets");
        assert_eq!(store.root(), dir.path().join("secrets"));

        match previous {
            Some(home) => std::env::set_var("HOME", home),
            None => std::env::remove_var("HOME"),
        }
    }
}
