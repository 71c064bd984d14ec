//! Kubernetes-style label selectors.
//!
//! A [`LabelSelector`] is the declarative form found in tenant resources. It
//! is compiled into a [`Selector`] before any document pool is queried, so a
//! malformed selector is always reported as a configuration error rather than
//! surfacing as a pool failure.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

/// Errors raised while compiling a label selector.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectorError {
    #[error("invalid label key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("invalid value '{value}' for label '{key}'")]
    InvalidValue { key: String, value: String },

    #[error("operator {operator} on '{key}' requires at least one value")]
    MissingValues { key: String, operator: SelectorOperator },

    #[error("operator {operator} on '{key}' does not take values")]
    UnexpectedValues { key: String, operator: SelectorOperator },
}

/// Set-based requirement operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectorOperator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

impl fmt::Display for SelectorOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectorOperator::In => write!(f, "In"),
            SelectorOperator::NotIn => write!(f, "NotIn"),
            SelectorOperator::Exists => write!(f, "Exists"),
            SelectorOperator::DoesNotExist => write!(f, "DoesNotExist"),
        }
    }
}

/// A single `matchExpressions` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSelectorRequirement {
    pub key: String,
    pub operator: SelectorOperator,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

/// Declarative label selector. All requirements are ANDed; an empty selector
/// matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_expressions: Vec<LabelSelectorRequirement>,
}

impl LabelSelector {
    /// Creates a selector from `key=value` pairs.
    pub fn from_labels<K, V>(labels: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            match_labels: labels
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            match_expressions: Vec::new(),
        }
    }

    /// Adds a set-based requirement.
    pub fn with_expression(
        mut self,
        key: impl Into<String>,
        operator: SelectorOperator,
        values: &[&str],
    ) -> Self {
        self.match_expressions.push(LabelSelectorRequirement {
            key: key.into(),
            operator,
            values: values.iter().map(|v| v.to_string()).collect(),
        });
        self
    }

    /// Validates the selector and compiles it into a matcher.
    pub fn compile(&self) -> Result<Selector, SelectorError> {
        let mut requirements = Vec::with_capacity(self.match_labels.len() + self.match_expressions.len());

        for (key, value) in &self.match_labels {
            validate_key(key)?;
            validate_value(key, value)?;
            requirements.push(Requirement::In {
                key: key.clone(),
                values: BTreeSet::from([value.clone()]),
            });
        }

        for expr in &self.match_expressions {
            validate_key(&expr.key)?;
            let requirement = match expr.operator {
                SelectorOperator::In | SelectorOperator::NotIn => {
                    if expr.values.is_empty() {
                        return Err(SelectorError::MissingValues {
                            key: expr.key.clone(),
                            operator: expr.operator,
                        });
                    }
                    for value in &expr.values {
                        validate_value(&expr.key, value)?;
                    }
                    let values = expr.values.iter().cloned().collect();
                    if expr.operator == SelectorOperator::In {
                        Requirement::In {
                            key: expr.key.clone(),
                            values,
                        }
                    } else {
                        Requirement::NotIn {
                            key: expr.key.clone(),
                            values,
                        }
                    }
                }
                SelectorOperator::Exists | SelectorOperator::DoesNotExist => {
                    if !expr.values.is_empty() {
                        return Err(SelectorError::UnexpectedValues {
                            key: expr.key.clone(),
                            operator: expr.operator,
                        });
                    }
                    if expr.operator == SelectorOperator::Exists {
                        Requirement::Exists(expr.key.clone())
                    } else {
                        Requirement::DoesNotExist(expr.key.clone())
                    }
                }
            };
            requirements.push(requirement);
        }

        Ok(Selector { requirements })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Requirement {
    In { key: String, values: BTreeSet<String> },
    NotIn { key: String, values: BTreeSet<String> },
    Exists(String),
    DoesNotExist(String),
}

impl Requirement {
    fn matches(&self, labels: &HashMap<String, String>) -> bool {
        match self {
            Requirement::In { key, values } => labels.get(key).is_some_and(|v| values.contains(v)),
            // Absent keys satisfy NotIn, as in Kubernetes.
            Requirement::NotIn { key, values } => !labels.get(key).is_some_and(|v| values.contains(v)),
            Requirement::Exists(key) => labels.contains_key(key),
            Requirement::DoesNotExist(key) => !labels.contains_key(key),
        }
    }
}

/// A validated label selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    requirements: Vec<Requirement>,
}

impl Selector {
    /// Returns true if the labels satisfy every requirement.
    pub fn matches(&self, labels: &HashMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }

    /// True for a selector without requirements, which matches everything.
    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .requirements
            .iter()
            .map(|r| match r {
                Requirement::In { key, values } if values.len() == 1 => {
                    format!("{}={}", key, values.iter().next().map(String::as_str).unwrap_or(""))
                }
                Requirement::In { key, values } => format!("{} in ({})", key, join(values)),
                Requirement::NotIn { key, values } => format!("{} notin ({})", key, join(values)),
                Requirement::Exists(key) => key.clone(),
                Requirement::DoesNotExist(key) => format!("!{}", key),
            })
            .collect();
        write!(f, "{}", parts.join(","))
    }
}

fn join(values: &BTreeSet<String>) -> String {
    values.iter().map(String::as_str).collect::<Vec<_>>().join(",")
}

static RE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]([-A-Za-z0-9_.]*[A-Za-z0-9])?$").unwrap());
static RE_DNS_SUBDOMAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$").unwrap()
});

/// Label keys are qualified names: an optional DNS subdomain prefix and a name.
fn validate_key(key: &str) -> Result<(), SelectorError> {
    let invalid = |reason: &str| SelectorError::InvalidKey {
        key: key.to_string(),
        reason: reason.to_string(),
    };

    let (prefix, name) = match key.split_once('/') {
        Some((prefix, name)) => (Some(prefix), name),
        None => (None, key),
    };

    if let Some(prefix) = prefix {
        if prefix.is_empty() || prefix.len() > 253 || !RE_DNS_SUBDOMAIN.is_match(prefix) {
            return Err(invalid("prefix must be a DNS subdomain"));
        }
    }
    if name.is_empty() {
        return Err(invalid("name must not be empty"));
    }
    if name.len() > 63 {
        return Err(invalid("name must be at most 63 characters"));
    }
    if !RE_NAME.is_match(name) {
        return Err(invalid(
            "name must consist of alphanumerics, '-', '_' or '.', starting and ending with an alphanumeric",
        ));
    }
    Ok(())
}

/// Label values may be empty; otherwise they follow the name rules.
fn validate_value(key: &str, value: &str) -> Result<(), SelectorError> {
    if value.is_empty() || (value.len() <= 63 && RE_NAME.is_match(value)) {
        Ok(())
    } else {
        Err(SelectorError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        })
    }
}
