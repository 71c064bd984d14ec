//! Configuration loader for the multi-file config directory.

use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

use super::error::{ConfigError, Result};
use super::resource::{
    AnyResource, ObjectMeta, PrometheusRuleResource, ResourceHeader, ResourceKind,
    ResourceWithPath, RulesTenantResource, SettingsResource, SettingsSpec,
};
use crate::rules::{RuleDocument, Selector};
use crate::sync::{DocumentSource, SourceError};

/// Loaded configuration from the config directory.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The settings resource; defaults apply when absent.
    pub settings: Option<ResourceWithPath<SettingsResource>>,
    /// All tenants, sorted by `namespace/name`.
    pub tenants: Vec<ResourceWithPath<RulesTenantResource>>,
    /// All rule documents, sorted by `namespace/name`.
    pub rules: Vec<ResourceWithPath<PrometheusRuleResource>>,
    /// Rule documents whose header parsed but whose spec did not.
    pub broken_rules: Vec<BrokenRuleDocument>,
}

/// A `PrometheusRule` file with a readable header and an unreadable spec.
///
/// Kept so that only tenants selecting it fail, with its identity in the reason.
#[derive(Debug, Clone)]
pub struct BrokenRuleDocument {
    pub metadata: ObjectMeta,
    /// Path relative to the config directory.
    pub path: PathBuf,
    pub message: String,
}

impl BrokenRuleDocument {
    /// `namespace/name`.
    pub fn key(&self) -> String {
        self.metadata.key()
    }
}

impl LoadedConfig {
    /// Returns the effective settings.
    pub fn settings(&self) -> SettingsSpec {
        self.settings
            .as_ref()
            .map(|s| s.resource.spec.clone())
            .unwrap_or_default()
    }
}

impl DocumentSource for LoadedConfig {
    fn list_by_selector(&self, selector: &Selector) -> std::result::Result<Vec<RuleDocument>, SourceError> {
        if let Some(broken) = self
            .broken_rules
            .iter()
            .find(|b| selector.matches(&b.metadata.labels))
        {
            return Err(SourceError::Malformed {
                document: broken.key(),
                message: broken.message.clone(),
            });
        }

        Ok(self
            .rules
            .iter()
            .filter(|r| selector.matches(&r.resource.metadata.labels))
            .map(|r| r.resource.to_document())
            .collect())
    }
}

/// Configuration loader for the config directory.
pub struct ConfigLoader {
    /// Root directory for configuration files.
    config_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new config loader for the given directory.
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    /// Returns the config directory path.
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Resolves a settings path (e.g. `secretsDir`) against the config directory.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let expanded = PathBuf::from(crate::secrets::expand_home(path));
        if expanded.is_absolute() {
            expanded
        } else {
            self.config_dir.join(expanded)
        }
    }

    /// Loads all configuration from the config directory.
    pub fn load(&self) -> Result<LoadedConfig> {
        if !self.config_dir.exists() {
            return Err(ConfigError::ConfigDirNotFound(self.config_dir.clone()));
        }

        let mut settings: Option<ResourceWithPath<SettingsResource>> = None;
        let mut tenants: Vec<ResourceWithPath<RulesTenantResource>> = Vec::new();
        let mut rules: Vec<ResourceWithPath<PrometheusRuleResource>> = Vec::new();
        let mut broken_rules: Vec<BrokenRuleDocument> = Vec::new();

        // Walk the config directory
        for entry in WalkDir::new(&self.config_dir)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();

            if !path.is_file() || !is_visible_yaml(&self.config_dir, path) {
                continue;
            }

            let relative_path = path
                .strip_prefix(&self.config_dir)
                .unwrap_or(path)
                .to_path_buf();

            let resource = match self.load_file(path) {
                Ok(resource) => resource,
                Err(ConfigError::ParseYaml { path: file, message }) => {
                    // A rule document with a readable header fails only the tenants selecting it.
                    let Some(metadata) = self.rule_header(path) else {
                        let err = ConfigError::ParseYaml { path: file, message };
                        log::warn!("Failed to load {}: {}", path.display(), err);
                        return Err(err);
                    };
                    let key = metadata.key();
                    if rules.iter().any(|r| r.resource.key() == key)
                        || broken_rules.iter().any(|b| b.key() == key)
                    {
                        return Err(ConfigError::DuplicateName {
                            kind: ResourceKind::PrometheusRule.to_string(),
                            name: key,
                        });
                    }
                    log::warn!(
                        "Rule document '{}' ({}) is malformed: {}",
                        key,
                        relative_path.display(),
                        message
                    );
                    broken_rules.push(BrokenRuleDocument {
                        metadata,
                        path: relative_path,
                        message,
                    });
                    continue;
                }
                Err(e) => {
                    log::warn!("Failed to load {}: {}", path.display(), e);
                    return Err(e);
                }
            };

            match resource {
                AnyResource::Settings(r) => {
                    if settings.is_some() {
                        return Err(ConfigError::DuplicateName {
                            kind: ResourceKind::Settings.to_string(),
                            name: r.metadata.name.clone(),
                        });
                    }
                    settings = Some(ResourceWithPath::new(r, relative_path));
                }
                AnyResource::RulesTenant(r) => {
                    if tenants.iter().any(|t| t.resource.key() == r.key()) {
                        return Err(ConfigError::DuplicateName {
                            kind: ResourceKind::RulesTenant.to_string(),
                            name: r.key(),
                        });
                    }
                    tenants.push(ResourceWithPath::new(r, relative_path));
                }
                AnyResource::PrometheusRule(r) => {
                    if rules.iter().any(|rule| rule.resource.key() == r.key())
                        || broken_rules.iter().any(|b| b.key() == r.key())
                    {
                        return Err(ConfigError::DuplicateName {
                            kind: ResourceKind::PrometheusRule.to_string(),
                            name: r.key(),
                        });
                    }
                    rules.push(ResourceWithPath::new(r, relative_path));
                }
            }
        }

        tenants.sort_by_key(|t| t.resource.key());
        rules.sort_by_key(|r| r.resource.key());
        broken_rules.sort_by_key(BrokenRuleDocument::key);
        check_tenant_targets(&tenants)?;

        Ok(LoadedConfig {
            settings,
            tenants,
            rules,
            broken_rules,
        })
    }

    /// Loads a single resource file.
    pub fn load_file(&self, path: &Path) -> Result<AnyResource> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;

        self.parse_resource(&content, path)
    }

    /// Parses a resource from YAML content.
    pub fn parse_resource(&self, content: &str, path: &Path) -> Result<AnyResource> {
        let parse_err = |e: serde_yaml::Error| ConfigError::ParseYaml {
            path: path.to_path_buf(),
            message: e.to_string(),
        };

        // First, parse the header to determine the kind
        let header: ResourceHeader = serde_yaml::from_str(content).map_err(parse_err)?;

        let accepted = header.kind.api_versions();
        if !accepted.contains(&header.api_version.as_str()) {
            return Err(ConfigError::InvalidApiVersion {
                kind: header.kind.to_string(),
                version: header.api_version,
                expected: accepted.join(", "),
            });
        }

        if header.metadata.name.trim().is_empty() {
            return Err(ConfigError::InvalidResource {
                path: path.to_path_buf(),
                message: "metadata.name must not be empty".to_string(),
            });
        }

        // Parse based on kind
        match header.kind {
            ResourceKind::Settings => {
                let resource: SettingsResource = serde_yaml::from_str(content).map_err(parse_err)?;
                Ok(AnyResource::Settings(resource))
            }
            ResourceKind::RulesTenant => {
                let resource: RulesTenantResource =
                    serde_yaml::from_str(content).map_err(parse_err)?;
                if resource.spec.id.trim().is_empty() || resource.spec.url.trim().is_empty() {
                    return Err(ConfigError::InvalidResource {
                        path: path.to_path_buf(),
                        message: "spec.id and spec.url are required".to_string(),
                    });
                }
                Ok(AnyResource::RulesTenant(resource))
            }
            ResourceKind::PrometheusRule => {
                let resource: PrometheusRuleResource =
                    serde_yaml::from_str(content).map_err(parse_err)?;
                Ok(AnyResource::PrometheusRule(resource))
            }
        }
    }

    /// Returns the metadata of a `PrometheusRule` file whose header is valid,
    /// even when its spec is not.
    fn rule_header(&self, path: &Path) -> Option<ObjectMeta> {
        let content = fs::read_to_string(path).ok()?;
        let header: ResourceHeader = serde_yaml::from_str(&content).ok()?;
        let valid = header.kind == ResourceKind::PrometheusRule
            && header.kind.api_versions().contains(&header.api_version.as_str())
            && !header.metadata.name.trim().is_empty();
        valid.then_some(header.metadata)
    }

    /// Deletes a resource file.
    pub fn delete_resource(&self, path: &Path) -> Result<()> {
        let full_path = self.checked_path(path)?;

        if !full_path.exists() {
            return Err(ConfigError::ResourceNotFound {
                kind: "unknown".to_string(),
                name: path.display().to_string(),
            });
        }

        fs::remove_file(&full_path).map_err(|e| ConfigError::RemoveFile {
            path: full_path,
            source: e,
        })?;

        Ok(())
    }

    /// Joins a relative resource path onto the config directory, refusing
    /// anything that could escape it.
    fn checked_path(&self, path: &Path) -> Result<PathBuf> {
        let escapes = path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(ConfigError::PathTraversal(path.display().to_string()));
        }
        Ok(self.config_dir.join(path))
    }
}

/// YAML files outside hidden directories.
fn is_visible_yaml(root: &Path, path: &Path) -> bool {
    // Check the relative path for any component starting with '.'
    if let Ok(relative) = path.strip_prefix(root) {
        let has_hidden_component = relative.components().any(|c| {
            c.as_os_str()
                .to_str()
                .map(|s| s.starts_with('.'))
                .unwrap_or(false)
        });
        if has_hidden_component {
            return false;
        }
    }

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    ext == "yaml" || ext == "yml"
}

/// Two tenant resources must not drive the same remote tenant.
fn check_tenant_targets(tenants: &[ResourceWithPath<RulesTenantResource>]) -> Result<()> {
    let mut seen: HashMap<(String, String), String> = HashMap::new();
    for tenant in tenants {
        let spec = &tenant.resource.spec;
        let target = (spec.url.trim_end_matches('/').to_string(), spec.id.clone());
        if let Some(first) = seen.get(&target) {
            return Err(ConfigError::DuplicateTenant {
                id: spec.id.clone(),
                url: spec.url.clone(),
                first: first.clone(),
                second: tenant.resource.key(),
            });
        }
        seen.insert(target, tenant.resource.key());
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
