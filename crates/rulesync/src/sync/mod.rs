//! The synchronization engine.
//!
//! A pass for one tenant flows through these stages:
//! - [`collect`]: label selectors against the document pool
//! - [`transform`]: overrides and external labels on a copy of the documents
//! - [`pack`]: one serialized submission per namespace key
//! - [`diff`]: remote namespaces that are no longer wanted
//! - [`apply`]: submit, then delete
//!
//! [`TenantReconciler`] drives the stages according to the tenant's
//! lifecycle phase.

pub mod collector;
pub mod differ;
pub mod error;
pub mod executor;
pub mod packer;
pub mod reconciler;
pub mod transformer;

#[cfg(test)]
pub(crate) mod testing;

pub use collector::{collect, DocumentSource};
pub use differ::{diff, inventory_namespaces, stale_namespaces};
pub use error::{Result, SourceError, SyncError, TenantSyncResult};
pub use executor::{apply, ApplyReport};
pub use packer::pack;
pub use reconciler::{ReconcileOutcome, TenantPhase, TenantReconciler};
pub use transformer::{transform, Override};
