//! Selector collection: label selectors in, deduplicated rule documents out.

use std::collections::HashSet;

use super::error::{Result, SourceError};
use crate::rules::{LabelSelector, RuleDocument, Selector};

/// A pool of rule documents that can be queried by label.
pub trait DocumentSource: Send + Sync {
    /// Returns every document whose labels match `selector`, in pool order.
    fn list_by_selector(
        &self,
        selector: &Selector,
    ) -> std::result::Result<Vec<RuleDocument>, SourceError>;
}

/// Resolves `selectors` against `pool` and unions the results.
///
/// Every selector is compiled before the pool is touched, so a syntax error
/// is reported as such and never masked by a pool failure. Documents matched
/// by more than one selector appear once, at their first position.
pub fn collect(selectors: &[LabelSelector], pool: &dyn DocumentSource) -> Result<Vec<RuleDocument>> {
    let compiled = selectors
        .iter()
        .map(LabelSelector::compile)
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut documents = Vec::new();

    for selector in &compiled {
        let matched = pool.list_by_selector(selector)?;
        log::debug!("Selector '{}' matched {} document(s)", selector, matched.len());

        for document in matched {
            if seen.insert((document.namespace.clone(), document.name.clone())) {
                documents.push(document);
            }
        }
    }

    Ok(documents)
}
