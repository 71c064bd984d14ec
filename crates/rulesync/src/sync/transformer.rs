//! Tenant policy: per-rule overrides and external label injection.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::rules::{Rule, RuleDocument, RuleGroup};

/// Per-rule override, keyed by alert or record name in the tenant spec.
///
/// `disable` wins over every other field. Label and annotation sets replace
/// the rule's sets wholesale when present (an explicit `{}` clears them);
/// `expr` and `for` replace only when non-empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Override {
    pub disable: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub expr: String,

    #[serde(rename = "for", skip_serializing_if = "String::is_empty")]
    pub for_duration: String,
}

impl Override {
    pub fn disabled() -> Self {
        Self {
            disable: true,
            ..Default::default()
        }
    }
}

/// Applies `overrides` and `external_labels` to a copy of `documents`.
///
/// Order of documents, groups and surviving rules is preserved. Groups left
/// without rules are dropped. Overrides naming unknown rules are ignored.
pub fn transform(
    documents: &[RuleDocument],
    overrides: &BTreeMap<String, Override>,
    external_labels: &BTreeMap<String, String>,
) -> Vec<RuleDocument> {
    documents
        .iter()
        .map(|document| RuleDocument {
            namespace: document.namespace.clone(),
            name: document.name.clone(),
            groups: document
                .groups
                .iter()
                .filter_map(|group| transform_group(group, overrides, external_labels))
                .collect(),
        })
        .collect()
}

fn transform_group(
    group: &RuleGroup,
    overrides: &BTreeMap<String, Override>,
    external_labels: &BTreeMap<String, String>,
) -> Option<RuleGroup> {
    let rules: Vec<Rule> = group
        .rules
        .iter()
        .filter_map(|rule| {
            let mut rule = match overrides.get(rule.identity()) {
                Some(o) if o.disable => {
                    log::debug!("Rule '{}' disabled by override", rule.identity());
                    return None;
                }
                Some(o) => apply_override(rule, o),
                None => rule.clone(),
            };
            inject_labels(&mut rule, external_labels);
            Some(rule)
        })
        .collect();

    // The ruler rejects empty groups, whether they came in empty or overrides emptied them.
    if rules.is_empty() {
        log::debug!("Group '{}' has no rules left, dropping it", group.name);
        return None;
    }

    Some(RuleGroup {
        name: group.name.clone(),
        interval: group.interval.clone(),
        limit: group.limit,
        rules,
    })
}

fn apply_override(rule: &Rule, o: &Override) -> Rule {
    let mut rule = rule.clone();

    if let Some(labels) = &o.labels {
        rule.labels = Some(labels.clone());
    }
    if let Some(annotations) = &o.annotations {
        rule.annotations = Some(annotations.clone());
    }
    if !o.expr.is_empty() {
        rule.expr = o.expr.clone();
    }
    if !o.for_duration.is_empty() {
        if rule.is_alert() {
            rule.for_duration = Some(o.for_duration.clone());
        } else {
            log::debug!(
                "Ignoring 'for' override on recording rule '{}'",
                rule.identity()
            );
        }
    }

    rule
}

fn inject_labels(rule: &mut Rule, external_labels: &BTreeMap<String, String>) {
    if external_labels.is_empty() {
        return;
    }
    let labels = rule.labels.get_or_insert_with(BTreeMap::new);
    for (key, value) in external_labels {
        labels.insert(key.clone(), value.clone());
    }
}
