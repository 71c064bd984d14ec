//! In-memory ruler used by the engine's unit tests.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::rules::{RuleGroupRef, SerializedRuleGroups};
use crate::ruler::{BackendFactory, Result, RulerBackend, RulerError, RulerSettings, RulerTarget};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    List,
    Submit(String),
    Delete(String),
}

/// Keeps namespace -> group names and records every call.
#[derive(Default)]
pub(crate) struct FakeRuler {
    pub namespaces: Mutex<BTreeMap<String, Vec<String>>>,
    pub calls: Mutex<Vec<Call>>,
    /// Namespace whose submit or delete fails with a 503.
    pub fail_namespace: Mutex<Option<String>>,
    pub fail_list: Mutex<bool>,
}

impl FakeRuler {
    pub fn holding(entries: &[(&str, &str)]) -> Self {
        let ruler = Self::default();
        {
            let mut namespaces = ruler.namespaces.lock().unwrap();
            for (namespace, group) in entries {
                namespaces
                    .entry(namespace.to_string())
                    .or_default()
                    .push(group.to_string());
            }
        }
        ruler
    }

    pub fn fail_on(self, namespace: &str) -> Self {
        *self.fail_namespace.lock().unwrap() = Some(namespace.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn namespace_names(&self) -> Vec<String> {
        self.namespaces.lock().unwrap().keys().cloned().collect()
    }

    fn check_failure(&self, namespace: &str) -> Result<()> {
        if self.fail_namespace.lock().unwrap().as_deref() == Some(namespace) {
            return Err(RulerError::Rejected {
                status: 503,
                body: "ruler unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RulerBackend for FakeRuler {
    async fn list_rule_groups(&self) -> Result<Vec<RuleGroupRef>> {
        self.calls.lock().unwrap().push(Call::List);
        if *self.fail_list.lock().unwrap() {
            return Err(RulerError::Network("connection refused".to_string()));
        }
        Ok(self
            .namespaces
            .lock()
            .unwrap()
            .iter()
            .flat_map(|(ns, groups)| groups.iter().map(move |g| RuleGroupRef::new(ns.clone(), g.clone())))
            .collect())
    }

    async fn submit_groups(&self, namespace: &str, groups: &SerializedRuleGroups) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Submit(namespace.to_string()));
        self.check_failure(namespace)?;

        let names: Vec<String> = groups
            .decode()
            .map_err(|e| RulerError::Parse(e.to_string()))?
            .groups
            .into_iter()
            .map(|g| g.name)
            .collect();
        let mut namespaces = self.namespaces.lock().unwrap();
        if names.is_empty() {
            namespaces.remove(namespace);
        } else {
            namespaces.insert(namespace.to_string(), names);
        }
        Ok(())
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Delete(namespace.to_string()));
        self.check_failure(namespace)?;
        self.namespaces.lock().unwrap().remove(namespace);
        Ok(())
    }
}

#[async_trait]
impl RulerBackend for Arc<FakeRuler> {
    async fn list_rule_groups(&self) -> Result<Vec<RuleGroupRef>> {
        self.as_ref().list_rule_groups().await
    }

    async fn submit_groups(&self, namespace: &str, groups: &SerializedRuleGroups) -> Result<()> {
        self.as_ref().submit_groups(namespace, groups).await
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<()> {
        self.as_ref().delete_namespace(namespace).await
    }
}

/// Hands out one shared [`FakeRuler`] and records (tenant id, auth scheme)
/// for every backend it builds.
#[derive(Default)]
pub(crate) struct FakeFactory {
    pub ruler: Arc<FakeRuler>,
    pub targets: Mutex<Vec<(String, &'static str)>>,
}

impl FakeFactory {
    pub fn with_ruler(ruler: FakeRuler) -> Self {
        Self {
            ruler: Arc::new(ruler),
            ..Default::default()
        }
    }

    pub fn targets(&self) -> Vec<(String, &'static str)> {
        self.targets.lock().unwrap().clone()
    }
}

impl BackendFactory for FakeFactory {
    fn backend(&self, _settings: &RulerSettings, target: RulerTarget) -> Result<Box<dyn RulerBackend>> {
        if target.url.is_empty() {
            return Err(RulerError::InvalidAddress {
                address: target.url,
                reason: "empty".to_string(),
            });
        }
        self.targets
            .lock()
            .unwrap()
            .push((target.tenant_id, target.credentials.scheme()));
        Ok(Box::new(Arc::clone(&self.ruler)))
    }
}
