//! Drives the remote ruler to the desired namespace set.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use super::error::{Result, SyncError};
use crate::rules::{NamespaceKey, SerializedRuleGroups};
use crate::ruler::RulerBackend;

/// Counts of calls issued by a successful [`apply`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyReport {
    pub submitted: usize,
    pub deleted: usize,
}

/// Submits every desired namespace, then deletes every stale one.
///
/// The first failing call aborts the remaining ones; calls already made are
/// not rolled back. Both call kinds are idempotent, so a later pass converges.
pub async fn apply(
    desired: &BTreeMap<NamespaceKey, SerializedRuleGroups>,
    to_delete: &BTreeSet<NamespaceKey>,
    backend: &dyn RulerBackend,
) -> Result<ApplyReport> {
    let mut report = ApplyReport::default();

    for (namespace, groups) in desired {
        backend
            .submit_groups(namespace.as_str(), groups)
            .await
            .map_err(|source| SyncError::RemoteCall {
                namespace: namespace.to_string(),
                source,
            })?;
        log::debug!(
            "Submitted namespace '{}' ({} group(s))",
            namespace,
            groups.group_count()
        );
        report.submitted += 1;
    }

    for namespace in to_delete {
        backend
            .delete_namespace(namespace.as_str())
            .await
            .map_err(|source| SyncError::RemoteCall {
                namespace: namespace.to_string(),
                source,
            })?;
        log::info!("Deleted stale namespace '{}'", namespace);
        report.deleted += 1;
    }

    Ok(report)
}
