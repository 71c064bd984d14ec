//! Rule documents, the ruler wire format and label selectors.

pub mod model;
pub mod selector;

pub use model::{
    NamespaceKey, Rule, RuleDocument, RuleGroup, RuleGroupRef, RuleNamespace,
    SerializedRuleGroups,
};
pub use selector::{
    LabelSelector, LabelSelectorRequirement, Selector, SelectorError, SelectorOperator,
};
