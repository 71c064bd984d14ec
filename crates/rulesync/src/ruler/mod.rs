//! Transports to a remote Mimir/Cortex ruler.
//!
//! A [`RulerBackend`] is bound to one tenant and exposes the three calls a
//! pass needs: list what the tenant holds, replace a namespace, delete a
//! namespace. Two implementations exist:
//! - [`HttpRuler`]: talks to the ruler API directly
//! - [`MimirtoolRuler`]: shells out to `mimirtool`

pub mod auth;
pub mod cli;
pub mod error;
pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::rules::{RuleGroupRef, SerializedRuleGroups};

pub use auth::{resolve_credentials, Credentials, SecretRef, TenantAuth};
pub use cli::MimirtoolRuler;
pub use error::{classify_tool_error, RulerError};
pub use http::HttpRuler;

/// Result type for ruler calls.
pub type Result<T> = std::result::Result<T, RulerError>;

/// Operations against one tenant of a remote ruler.
#[async_trait]
pub trait RulerBackend: Send + Sync {
    /// Lists every (namespace, group) pair the tenant currently holds.
    async fn list_rule_groups(&self) -> Result<Vec<RuleGroupRef>>;

    /// Makes `namespace` hold exactly `groups`. Empty `groups` removes the namespace.
    async fn submit_groups(&self, namespace: &str, groups: &SerializedRuleGroups) -> Result<()>;

    /// Removes `namespace` and all its groups. Deleting an absent namespace succeeds.
    async fn delete_namespace(&self, namespace: &str) -> Result<()>;
}

/// Which transport a tenant's backend uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Http,
    Cli,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Http => write!(f, "http"),
            BackendKind::Cli => write!(f, "cli"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "http" => Ok(BackendKind::Http),
            "cli" => Ok(BackendKind::Cli),
            other => Err(format!("unknown ruler backend '{}'", other)),
        }
    }
}

fn default_api_path() -> String {
    "/prometheus/config/v1/rules".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_mimirtool_path() -> PathBuf {
    PathBuf::from("mimirtool")
}

fn default_command_timeout() -> u64 {
    60
}

/// Transport settings shared by all tenants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RulerSettings {
    #[serde(default)]
    pub backend: BackendKind,

    /// Path of the rules API below the tenant URL.
    #[serde(default = "default_api_path")]
    pub api_path: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    #[serde(default = "default_mimirtool_path")]
    pub mimirtool_path: PathBuf,

    /// Upper bound for one mimirtool invocation, in seconds.
    #[serde(default = "default_command_timeout")]
    pub command_timeout: u64,
}

impl Default for RulerSettings {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            api_path: default_api_path(),
            request_timeout: default_request_timeout(),
            connect_timeout: default_connect_timeout(),
            mimirtool_path: default_mimirtool_path(),
            command_timeout: default_command_timeout(),
        }
    }
}

/// Where and as whom a backend talks.
#[derive(Debug, Clone)]
pub struct RulerTarget {
    pub tenant_id: String,
    pub url: String,
    pub credentials: Credentials,
}

/// Builds a backend for a tenant at the start of each pass.
pub trait BackendFactory: Send + Sync {
    fn backend(&self, settings: &RulerSettings, target: RulerTarget)
        -> Result<Box<dyn RulerBackend>>;
}

/// Builds the backend selected by [`RulerSettings::backend`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultBackendFactory;

impl BackendFactory for DefaultBackendFactory {
    fn backend(
        &self,
        settings: &RulerSettings,
        target: RulerTarget,
    ) -> Result<Box<dyn RulerBackend>> {
        match settings.backend {
            BackendKind::Http => Ok(Box::new(HttpRuler::new(settings, target)?)),
            BackendKind::Cli => Ok(Box::new(MimirtoolRuler::new(settings, target)?)),
        }
    }
}
