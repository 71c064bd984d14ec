//! Remote state diff: which namespaces the ruler holds that are no longer wanted.

use std::collections::BTreeSet;

use super::error::{Result, SyncError};
use crate::rules::{NamespaceKey, RuleGroupRef};
use crate::ruler::RulerBackend;

/// Reduces an inventory to its distinct namespaces.
pub fn inventory_namespaces(inventory: &[RuleGroupRef]) -> BTreeSet<NamespaceKey> {
    inventory
        .iter()
        .map(|entry| NamespaceKey::new(entry.namespace.as_str()))
        .collect()
}

/// Namespaces present in `inventory` but absent from `desired`.
pub fn stale_namespaces(
    desired: &BTreeSet<NamespaceKey>,
    inventory: &[RuleGroupRef],
) -> BTreeSet<NamespaceKey> {
    inventory_namespaces(inventory)
        .into_iter()
        .filter(|namespace| !desired.contains(namespace))
        .collect()
}

/// Lists the tenant's remote inventory and returns the namespaces to delete.
pub async fn diff(
    desired: &BTreeSet<NamespaceKey>,
    backend: &dyn RulerBackend,
) -> Result<BTreeSet<NamespaceKey>> {
    let inventory = backend
        .list_rule_groups()
        .await
        .map_err(SyncError::RemoteList)?;
    let stale = stale_namespaces(desired, &inventory);
    log::debug!(
        "Remote holds {} group(s); {} namespace(s) to delete",
        inventory.len(),
        stale.len()
    );
    Ok(stale)
}
