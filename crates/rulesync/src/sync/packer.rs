//! Packs transformed documents into per-namespace ruler submissions.

use std::collections::BTreeMap;

use super::error::{Result, SyncError};
use crate::rules::{NamespaceKey, RuleDocument, RuleNamespace, SerializedRuleGroups};

/// Serializes each document into the canonical `groups:` body, keyed by its
/// namespace key. Only evaluation-relevant fields are emitted.
///
/// The first invalid or unserializable document aborts the whole pack.
pub fn pack(documents: &[RuleDocument]) -> Result<BTreeMap<NamespaceKey, SerializedRuleGroups>> {
    let mut packed = BTreeMap::new();
    let mut owners: BTreeMap<NamespaceKey, String> = BTreeMap::new();

    for document in documents {
        let identity = document.identity();

        for group in &document.groups {
            for rule in &group.rules {
                rule.check().map_err(|message| SyncError::Serialization {
                    document: identity.clone(),
                    message: format!("group '{}': {}", group.name, message),
                })?;
            }
        }

        let key = document.namespace_key();
        if let Some(owner) = owners.get(&key) {
            return Err(SyncError::Serialization {
                document: identity,
                message: format!("namespace key '{}' is already used by '{}'", key, owner),
            });
        }

        let body = SerializedRuleGroups::encode(&RuleNamespace {
            groups: document.groups.clone(),
        })
        .map_err(|e| SyncError::Serialization {
            document: identity.clone(),
            message: e.to_string(),
        })?;

        log::debug!(
            "Packed '{}' into namespace '{}' ({} group(s))",
            identity,
            key,
            body.group_count()
        );
        owners.insert(key.clone(), identity);
        packed.insert(key, body);
    }

    Ok(packed)
}
