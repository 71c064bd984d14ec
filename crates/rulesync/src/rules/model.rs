//! Prometheus rule documents and the canonical ruler submission format.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A rule document selected from the pool: one `PrometheusRule` resource.
///
/// Maps 1:1 to a namespace on the remote ruler.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleDocument {
    /// Namespace of the source resource.
    pub namespace: String,
    /// Name of the source resource.
    pub name: String,
    /// Rule groups, in evaluation order.
    pub groups: Vec<RuleGroup>,
}

impl RuleDocument {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, groups: Vec<RuleGroup>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            groups,
        }
    }

    /// Returns the remote namespace this document is stored under.
    pub fn namespace_key(&self) -> NamespaceKey {
        NamespaceKey::for_document(&self.namespace, &self.name)
    }

    /// Returns `namespace/name`, used to identify the document in errors and logs.
    pub fn identity(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Total number of rules across all groups.
    pub fn rule_count(&self) -> usize {
        self.groups.iter().map(|g| g.rules.len()).sum()
    }
}

/// A list of sequentially evaluated recording and alerting rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleGroup {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,

    /// Maximum number of alerts or series the group may produce; 0 is unlimited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,

    #[serde(default)]
    pub rules: Vec<Rule>,
}

/// An alerting or recording rule.
///
/// Exactly one of `alert` and `record` must be set. Both are kept as options
/// so a rule that breaks this still parses; [`Rule::check`] rejects it when
/// its document is packed, failing only the tenants that select it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<String>,

    #[serde(deserialize_with = "deserialize_expr")]
    pub expr: String,

    #[serde(default, rename = "for", skip_serializing_if = "Option::is_none")]
    pub for_duration: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_firing_for: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

impl Rule {
    /// Creates an alerting rule.
    pub fn alert(name: impl Into<String>, expr: impl Into<String>) -> Self {
        Self {
            alert: Some(name.into()),
            expr: expr.into(),
            ..Default::default()
        }
    }

    /// Creates a recording rule.
    pub fn record(name: impl Into<String>, expr: impl Into<String>) -> Self {
        Self {
            record: Some(name.into()),
            expr: expr.into(),
            ..Default::default()
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn with_for(mut self, duration: impl Into<String>) -> Self {
        self.for_duration = Some(duration.into());
        self
    }

    /// The name overrides are keyed by: the alert name if set, else the record name.
    pub fn identity(&self) -> &str {
        match (&self.alert, &self.record) {
            (Some(alert), _) if !alert.is_empty() => alert,
            (_, Some(record)) => record,
            _ => "",
        }
    }

    pub fn is_alert(&self) -> bool {
        self.alert.as_deref().is_some_and(|a| !a.is_empty())
    }

    /// Checks the alert/record exclusivity and that an expression is present.
    pub fn check(&self) -> Result<(), String> {
        let has_alert = self.is_alert();
        let has_record = self.record.as_deref().is_some_and(|r| !r.is_empty());
        match (has_alert, has_record) {
            (true, true) => {
                return Err(format!(
                    "rule '{}' sets both alert and record",
                    self.identity()
                ))
            }
            (false, false) => return Err("rule has neither alert nor record name".to_string()),
            _ => {}
        }
        if self.expr.trim().is_empty() {
            return Err(format!("rule '{}' has an empty expr", self.identity()));
        }
        if !has_alert && (self.for_duration.is_some() || self.keep_firing_for.is_some()) {
            return Err(format!(
                "recording rule '{}' cannot set for or keep_firing_for",
                self.identity()
            ));
        }
        Ok(())
    }
}

/// `expr` is an int-or-string in PrometheusRule manifests (`expr: 1` is valid).
fn deserialize_expr<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IntOrString {
        Int(i64),
        Float(f64),
        Str(String),
    }

    Ok(match IntOrString::deserialize(deserializer)? {
        IntOrString::Int(i) => i.to_string(),
        IntOrString::Float(f) => f.to_string(),
        IntOrString::Str(s) => s,
    })
}

/// Identifier of a rule namespace on the remote ruler.
///
/// Derived from a source document as `<namespace>_<name>`, but any string the
/// ruler accepts as a namespace path segment is a valid key (remote inventory
/// entries are wrapped as-is).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NamespaceKey(String);

impl NamespaceKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn for_document(namespace: &str, name: &str) -> Self {
        Self(format!("{}_{}", namespace, name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NamespaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NamespaceKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for NamespaceKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// The canonical submission document: only `groups`, nothing else.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleNamespace {
    #[serde(default)]
    pub groups: Vec<RuleGroup>,
}

/// Serialized YAML body of a [`RuleNamespace`], ready to hand to a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedRuleGroups {
    content: String,
    group_count: usize,
}

impl SerializedRuleGroups {
    /// Serializes a namespace into its canonical YAML form.
    pub fn encode(namespace: &RuleNamespace) -> Result<Self, serde_yaml::Error> {
        Ok(Self {
            content: serde_yaml::to_string(namespace)?,
            group_count: namespace.groups.len(),
        })
    }

    /// Parses the YAML body back into groups.
    pub fn decode(&self) -> Result<RuleNamespace, serde_yaml::Error> {
        serde_yaml::from_str(&self.content)
    }

    pub fn as_str(&self) -> &str {
        &self.content
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.content.as_bytes()
    }

    /// True when the namespace should hold no groups at all.
    pub fn is_empty(&self) -> bool {
        self.group_count == 0
    }

    pub fn group_count(&self) -> usize {
        self.group_count
    }
}

/// One entry of the remote inventory: a rule group and the namespace holding it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleGroupRef {
    pub namespace: String,
    #[serde(rename = "rulegroup")]
    pub group: String,
}

impl RuleGroupRef {
    pub fn new(namespace: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            group: group.into(),
        }
    }
}
