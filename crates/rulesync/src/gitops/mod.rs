//! GitOps configuration system for rulesync.
//!
//! This module provides a Kubernetes-style configuration system with:
//! - Multi-file YAML configurations
//! - Three resource kinds: Settings, RulesTenant, PrometheusRule
//! - File system watching for real-time updates
//! - A reconciler that runs every tenant's pass once per trigger

pub mod error;
pub mod loader;
pub mod reconciler;
pub mod resource;
pub mod sync_scheduler;
pub mod watcher;

pub use error::{ConfigError, Result};
pub use loader::{BrokenRuleDocument, ConfigLoader, LoadedConfig};
pub use reconciler::{ConfigReconciler, CycleReport};
pub use resource::{
    AnyResource, ObjectMeta, PrometheusRuleResource, PrometheusRuleSpec, Resource, ResourceKind,
    ResourceWithPath, RuleSelection, RulesTenantResource, RulesTenantSpec, SettingsResource,
    SettingsSpec, API_VERSION, PROMETHEUS_OPERATOR_API_VERSION,
};
pub use sync_scheduler::SyncScheduler;
pub use watcher::{ChangeKind, ConfigChangeEvent, ConfigWatcher};
