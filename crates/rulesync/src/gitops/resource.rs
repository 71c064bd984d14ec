//! K8s-style resource types for the config directory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::rules::{LabelSelector, RuleDocument, RuleGroup};
use crate::ruler::{RulerSettings, TenantAuth};
use crate::sync::Override;

/// The API version for rulesync's own resources.
pub const API_VERSION: &str = "rulesync.io/v1";

/// The Prometheus Operator API version, accepted for `PrometheusRule` so that
/// existing manifests can be dropped into `rules/` unchanged.
pub const PROMETHEUS_OPERATOR_API_VERSION: &str = "monitoring.coreos.com/v1";

/// Namespace assigned to resources that do not set one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// The kind of resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Settings,
    RulesTenant,
    PrometheusRule,
}

impl ResourceKind {
    /// API versions a resource of this kind may declare.
    pub fn api_versions(&self) -> &'static [&'static str] {
        match self {
            ResourceKind::PrometheusRule => &[API_VERSION, PROMETHEUS_OPERATOR_API_VERSION],
            _ => &[API_VERSION],
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Settings => write!(f, "Settings"),
            ResourceKind::RulesTenant => write!(f, "RulesTenant"),
            ResourceKind::PrometheusRule => write!(f, "PrometheusRule"),
        }
    }
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

/// Metadata for a resource, following K8s conventions.
///
/// Server-populated fields such as `uid` or `managedFields` are dropped on parse.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// The name of the resource, unique per kind and namespace.
    pub name: String,

    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Key-value labels for organizing and selecting resources.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,

    /// Key-value annotations for storing additional metadata.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub annotations: HashMap<String, String>,

    /// Set when the resource has been marked for deletion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

impl Default for ObjectMeta {
    fn default() -> Self {
        Self::new("")
    }
}

impl ObjectMeta {
    /// Creates a new ObjectMeta with just a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: default_namespace(),
            labels: HashMap::new(),
            annotations: HashMap::new(),
            deletion_timestamp: None,
        }
    }

    /// `namespace/name`.
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// A generic K8s-style resource wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource<T> {
    /// API version, `rulesync.io/v1` (or the operator's for rule documents).
    pub api_version: String,

    /// The kind of resource.
    pub kind: ResourceKind,

    /// Resource metadata.
    pub metadata: ObjectMeta,

    /// The resource specification.
    pub spec: T,
}

impl<T> Resource<T> {
    /// Creates a new resource with the given kind and spec.
    pub fn new(kind: ResourceKind, name: impl Into<String>, spec: T) -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind,
            metadata: ObjectMeta::new(name),
            spec,
        }
    }

    /// Returns the name of the resource.
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Returns `namespace/name`.
    pub fn key(&self) -> String {
        self.metadata.key()
    }
}

// ============================================================================
// Settings Resource
// ============================================================================

fn default_resync_interval() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

fn default_secrets_dir() -> String {
    "secrets".to_string()
}

/// Settings specification - daemon-wide configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsSpec {
    /// Seconds between periodic reconciliation cycles.
    #[serde(default = "default_resync_interval")]
    pub resync_interval: u64,

    /// Reconcile when files in the config directory change.
    #[serde(default = "default_true")]
    pub watch: bool,

    /// Ruler transport settings.
    #[serde(default)]
    pub ruler: RulerSettings,

    /// Mounted secrets root, relative to the config directory unless absolute.
    #[serde(default = "default_secrets_dir")]
    pub secrets_dir: String,

    /// Where to write the tenant status snapshot after each cycle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_file: Option<String>,
}

impl Default for SettingsSpec {
    fn default() -> Self {
        Self {
            resync_interval: default_resync_interval(),
            watch: true,
            ruler: RulerSettings::default(),
            secrets_dir: default_secrets_dir(),
            status_file: None,
        }
    }
}

pub type SettingsResource = Resource<SettingsSpec>;

// ============================================================================
// RulesTenant Resource
// ============================================================================

/// Which rule documents a tenant receives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSelection {
    /// Label selectors; their matches are unioned. No selectors selects nothing.
    #[serde(default)]
    pub selectors: Vec<LabelSelector>,
}

/// A tenant on a remote ruler and the policy applied to its rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RulesTenantSpec {
    /// Tenant id on the ruler (`X-Scope-OrgID`).
    pub id: String,

    /// Ruler address.
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<TenantAuth>,

    #[serde(default)]
    pub rules: RuleSelection,

    /// Per-rule overrides keyed by alert or record name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub overrides: BTreeMap<String, Override>,

    /// Labels set on every rule; they win over the rule's own values.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub external_labels: BTreeMap<String, String>,
}

pub type RulesTenantResource = Resource<RulesTenantSpec>;

impl RulesTenantResource {
    /// True once the tenant carries a deletion marker.
    pub fn is_marked_for_deletion(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }
}

// ============================================================================
// PrometheusRule Resource
// ============================================================================

/// A rule document: ordered rule groups.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrometheusRuleSpec {
    #[serde(default)]
    pub groups: Vec<RuleGroup>,
}

pub type PrometheusRuleResource = Resource<PrometheusRuleSpec>;

impl PrometheusRuleResource {
    /// Copies the resource into the engine's document form.
    pub fn to_document(&self) -> RuleDocument {
        RuleDocument::new(
            self.metadata.namespace.clone(),
            self.metadata.name.clone(),
            self.spec.groups.clone(),
        )
    }
}

// ============================================================================
// Any Resource (for generic handling)
// ============================================================================

/// A resource that can be any of the supported types.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum AnyResource {
    Settings(SettingsResource),
    RulesTenant(RulesTenantResource),
    PrometheusRule(PrometheusRuleResource),
}

impl AnyResource {
    /// Returns the kind of this resource.
    pub fn kind(&self) -> ResourceKind {
        match self {
            AnyResource::Settings(_) => ResourceKind::Settings,
            AnyResource::RulesTenant(_) => ResourceKind::RulesTenant,
            AnyResource::PrometheusRule(_) => ResourceKind::PrometheusRule,
        }
    }

    /// Returns the name of this resource.
    pub fn name(&self) -> &str {
        &self.metadata().name
    }

    /// Returns the metadata of this resource.
    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            AnyResource::Settings(r) => &r.metadata,
            AnyResource::RulesTenant(r) => &r.metadata,
            AnyResource::PrometheusRule(r) => &r.metadata,
        }
    }
}

/// Intermediate struct for parsing resources before determining their type.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceHeader {
    pub api_version: String,
    pub kind: ResourceKind,
    pub metadata: ObjectMeta,
}

// ============================================================================
// Resource with path information
// ============================================================================

/// A resource along with its file path.
#[derive(Debug, Clone)]
pub struct ResourceWithPath<T> {
    /// The resource.
    pub resource: T,
    /// The file path relative to the config directory.
    pub path: std::path::PathBuf,
}

impl<T> ResourceWithPath<T> {
    pub fn new(resource: T, path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            resource,
            path: path.into(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
