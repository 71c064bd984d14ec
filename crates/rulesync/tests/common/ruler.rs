//! In-memory ruler backend.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rulesync::ruler::{self, BackendFactory, RulerBackend, RulerError, RulerSettings, RulerTarget};
use rulesync::rules::{RuleGroupRef, RuleNamespace, SerializedRuleGroups};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List,
    Submit(String),
    Delete(String),
}

/// Holds namespace -> submitted groups for one tenant and records every call.
#[derive(Default)]
pub struct RecordingRuler {
    namespaces: Mutex<BTreeMap<String, RuleNamespace>>,
    calls: Mutex<Vec<Call>>,
    failing: Mutex<Option<String>>,
}

impl RecordingRuler {
    /// Pre-populates the ruler with `(namespace, group)` pairs.
    pub fn holding(entries: &[(&str, &str)]) -> Self {
        let ruler = Self::default();
        {
            let mut namespaces = ruler.namespaces.lock().unwrap();
            for (namespace, group) in entries {
                let groups = &mut namespaces.entry(namespace.to_string()).or_default().groups;
                groups.push(rulesync::rules::RuleGroup {
                    name: group.to_string(),
                    interval: None,
                    limit: None,
                    rules: Vec::new(),
                });
            }
        }
        ruler
    }

    /// Makes submit and delete calls for `namespace` fail with a 503.
    pub fn fail_on(&self, namespace: Option<&str>) {
        *self.failing.lock().unwrap() = namespace.map(str::to_string);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn namespace_names(&self) -> Vec<String> {
        self.namespaces.lock().unwrap().keys().cloned().collect()
    }

    pub fn namespace(&self, name: &str) -> Option<RuleNamespace> {
        self.namespaces.lock().unwrap().get(name).cloned()
    }

    fn check(&self, namespace: &str) -> ruler::Result<()> {
        if self.failing.lock().unwrap().as_deref() == Some(namespace) {
            return Err(RulerError::Rejected {
                status: 503,
                body: "ruler unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RulerBackend for RecordingRuler {
    async fn list_rule_groups(&self) -> ruler::Result<Vec<RuleGroupRef>> {
        self.calls.lock().unwrap().push(Call::List);
        Ok(self
            .namespaces
            .lock()
            .unwrap()
            .iter()
            .flat_map(|(ns, body)| body.groups.iter().map(move |g| RuleGroupRef::new(ns.clone(), g.name.clone())))
            .collect())
    }

    async fn submit_groups(&self, namespace: &str, groups: &SerializedRuleGroups) -> ruler::Result<()> {
        self.calls.lock().unwrap().push(Call::Submit(namespace.to_string()));
        self.check(namespace)?;
        let body = groups.decode().map_err(|e| RulerError::Parse(e.to_string()))?;
        let mut namespaces = self.namespaces.lock().unwrap();
        if body.groups.is_empty() {
            namespaces.remove(namespace);
        } else {
            namespaces.insert(namespace.to_string(), body);
        }
        Ok(())
    }

    async fn delete_namespace(&self, namespace: &str) -> ruler::Result<()> {
        self.calls.lock().unwrap().push(Call::Delete(namespace.to_string()));
        self.check(namespace)?;
        self.namespaces.lock().unwrap().remove(namespace);
        Ok(())
    }
}

struct Shared(Arc<RecordingRuler>);

#[async_trait]
impl RulerBackend for Shared {
    async fn list_rule_groups(&self) -> ruler::Result<Vec<RuleGroupRef>> {
        self.0.list_rule_groups().await
    }

    async fn submit_groups(&self, namespace: &str, groups: &SerializedRuleGroups) -> ruler::Result<()> {
        self.0.submit_groups(namespace, groups).await
    }

    async fn delete_namespace(&self, namespace: &str) -> ruler::Result<()> {
        self.0.delete_namespace(namespace).await
    }
}

/// One [`RecordingRuler`] per tenant id, created on first use.
#[derive(Default)]
pub struct RecordingFactory {
    rulers: Mutex<BTreeMap<String, Arc<RecordingRuler>>>,
    /// (tenant id, auth scheme) for every backend handed out.
    targets: Mutex<Vec<(String, &'static str)>>,
}

impl RecordingFactory {
    /// Installs a pre-populated ruler for `tenant_id`.
    pub fn with_ruler(self, tenant_id: &str, ruler: RecordingRuler) -> Self {
        self.rulers
            .lock()
            .unwrap()
            .insert(tenant_id.to_string(), Arc::new(ruler));
        self
    }

    pub fn ruler(&self, tenant_id: &str) -> Arc<RecordingRuler> {
        Arc::clone(
            self.rulers
                .lock()
                .unwrap()
                .entry(tenant_id.to_string())
                .or_default(),
        )
    }

    pub fn targets(&self) -> Vec<(String, &'static str)> {
        self.targets.lock().unwrap().clone()
    }
}

impl BackendFactory for RecordingFactory {
    fn backend(&self, _settings: &RulerSettings, target: RulerTarget) -> ruler::Result<Box<dyn RulerBackend>> {
        self.targets
            .lock()
            .unwrap()
            .push((target.tenant_id.clone(), target.credentials.scheme()));
        Ok(Box::new(Shared(self.ruler(&target.tenant_id))))
    }
}
