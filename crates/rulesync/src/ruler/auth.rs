//! Tenant authentication against the ruler.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::secrets::{Result, SecretStore};

/// Key a token secret stores its value under.
pub const TOKEN_SECRET_KEY: &str = "token";
/// Key an API-key secret stores its value under.
pub const KEY_SECRET_KEY: &str = "key";

/// Reference to a secret by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRef {
    pub name: String,
}

/// Authentication settings of a tenant.
///
/// Two schemes are supported: a bearer token, or a user with an API key.
/// Either secret may be given inline or through a [`SecretRef`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantAuth {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_secret_ref: Option<SecretRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_secret_ref: Option<SecretRef>,
}

/// Resolved credentials for one pass.
#[derive(Debug, Default)]
pub enum Credentials {
    #[default]
    Anonymous,
    Bearer(SecretString),
    Basic { user: String, key: SecretString },
}

impl Clone for Credentials {
    fn clone(&self) -> Self {
        match self {
            Credentials::Anonymous => Credentials::Anonymous,
            Credentials::Bearer(token) => {
                Credentials::Bearer(SecretString::from(token.expose_secret().to_string()))
            }
            Credentials::Basic { user, key } => Credentials::Basic {
                user: user.clone(),
                key: SecretString::from(key.expose_secret().to_string()),
            },
        }
    }
}

impl Credentials {
    /// Short description safe to log.
    pub fn scheme(&self) -> &'static str {
        match self {
            Credentials::Anonymous => "anonymous",
            Credentials::Bearer(_) => "bearer",
            Credentials::Basic { .. } => "basic",
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Resolves tenant authentication into credentials.
///
/// Checked in order: inline token, token secret, inline key, key secret.
/// The first one configured wins; nothing configured means anonymous.
pub fn resolve_credentials(auth: Option<&TenantAuth>, store: &dyn SecretStore) -> Result<Credentials> {
    let Some(auth) = auth else {
        return Ok(Credentials::Anonymous);
    };
    let user = non_empty(&auth.user).unwrap_or_default().to_string();

    if let Some(token) = non_empty(&auth.token) {
        return Ok(Credentials::Bearer(SecretString::from(token.to_string())));
    }

    if let Some(secret_ref) = &auth.token_secret_ref {
        let token = store.get(&secret_ref.name, TOKEN_SECRET_KEY)?;
        return Ok(Credentials::Bearer(token));
    }

    if let Some(key) = non_empty(&auth.key) {
        return Ok(Credentials::Basic {
            user,
            key: SecretString::from(key.to_string()),
        });
    }

    if let Some(secret_ref) = &auth.key_secret_ref {
        let key = store.get(&secret_ref.name, KEY_SECRET_KEY)?;
        return Ok(Credentials::Basic { user, key });
    }

    Ok(Credentials::Anonymous)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::SecretError;
    use std::collections::HashMap;

    struct FakeStore(HashMap<(String, String), String>);

    impl FakeStore {
        fn new(entries: &[(&str, &str, &str)]) -> Self {
            Self(
                entries
                    .iter()
                    .map(|(n, k, v)| ((n.to_string(), k.to_string()), v.to_string()))
                    .collect(),
            )
        }
    }

    impl SecretStore for FakeStore {
        fn get(&self, name: &str, key: &str) -> Result<SecretString> {
            self.0
                .get(&(name.to_string(), key.to_string()))
                .map(|v| SecretString::from(v.clone()))
                .ok_or_else(|| SecretError::NotFound {
                    name: name.to_string(),
                    key: key.to_string(),
                })
        }
    }

    fn secret_ref(name: &str) -> Option<SecretRef> {
        Some(SecretRef {
            name: name.to_string(),
        })
    }

    fn store() -> FakeStore {
        FakeStore::new(&[("tok", "token", "from-secret"), ("api", "key", "key-from-secret")])
    }

    fn bearer(creds: Credentials) -> String {
        match creds {
            Credentials::Bearer(token) => token.expose_secret().to_string(),
            other => panic!("expected bearer, got {}", other.scheme()),
        }
    }

    fn basic(creds: Credentials) -> (String, String) {
        match creds {
            Credentials::Basic { user, key } => (user, key.expose_secret().to_string()),
            other => panic!("expected basic, got {}", other.scheme()),
        }
    }

    #[test]
    fn test_no_auth_is_anonymous() {
        let creds = resolve_credentials(None, &store()).unwrap();
        assert!(matches!(creds, Credentials::Anonymous));

        let creds = resolve_credentials(Some(&TenantAuth::default()), &store()).unwrap();
        assert!(matches!(creds, Credentials::Anonymous));
    }

    #[test]
    fn test_inline_token_wins_over_everything() {
        let auth = TenantAuth {
            token: Some("inline".to_string()),
            token_secret_ref: secret_ref("tok"),
            user: Some("u".to_string()),
            key: Some("k".to_string()),
            key_secret_ref: secret_ref("api"),
        };
        assert_eq!(bearer(resolve_credentials(Some(&auth), &store()).unwrap()), "inline");
    }

    #[test]
    fn test_token_secret_wins_over_key() {
        let auth = TenantAuth {
            token_secret_ref: secret_ref("tok"),
            user: Some("u".to_string()),
            key: Some("k".to_string()),
            ..Default::default()
        };
        assert_eq!(
            bearer(resolve_credentials(Some(&auth), &store()).unwrap()),
            "from-secret"
        );
    }

    #[test]
    fn test_inline_key_wins_over_key_secret() {
        let auth = TenantAuth {
            user: Some("u".to_string()),
            key: Some("k".to_string()),
            key_secret_ref: secret_ref("api"),
            ..Default::default()
        };
        assert_eq!(
            basic(resolve_credentials(Some(&auth), &store()).unwrap()),
            ("u".to_string(), "k".to_string())
        );
    }

    #[test]
    fn test_key_secret() {
        let auth = TenantAuth {
            user: Some("u".to_string()),
            key_secret_ref: secret_ref("api"),
            ..Default::default()
        };
        assert_eq!(
            basic(resolve_credentials(Some(&auth), &store()).unwrap()),
            ("u".to_string(), "key-from-secret".to_string())
        );
    }

    #[test]
    fn test_empty_inline_values_are_skipped() {
        let auth = TenantAuth {
            token: Some(String::new()),
            key: Some(String::new()),
            user: Some("u".to_string()),
            key_secret_ref: secret_ref("api"),
            ..Default::default()
        };
        let (_, key) = basic(resolve_credentials(Some(&auth), &store()).unwrap());
        assert_eq!(key, "key-from-secret");
    }

    #[test]
    fn test_missing_secret_fails() {
        let auth = TenantAuth {
            token_secret_ref: secret_ref("absent"),
            ..Default::default()
        };
        assert!(matches!(
            resolve_credentials(Some(&auth), &store()),
            Err(SecretError::NotFound { .. })
        ));
    }

    #[test]
    fn test_debug_does_not_leak_secret() {
        let creds = Credentials::Bearer(SecretString::from("super-secret".to_string()));
        assert!(!format!("{:?}", creds).contains("super-secret"));
    }

    #[test]
    fn test_auth_deserializes_camel_case() {
        let auth: TenantAuth =
            serde_yaml::from_str("user: u\nkeySecretRef:\n  name: api\n").unwrap();
        assert_eq!(auth.user.as_deref(), Some("u"));
        assert_eq!(auth.key_secret_ref, secret_ref("api"));
    }
}
