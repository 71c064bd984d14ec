//! Tenant reconciler: one pass per trigger, driven by the tenant's lifecycle.
//!
//! An `Active` tenant runs collect, transform, pack, diff and apply. A tenant
//! carrying a deletion marker is `Deleting`: every namespace it holds on the
//! remote ruler is deleted, and only a clean deletion pass moves it to
//! `Removed`. Failures never change the phase; the next trigger retries from
//! scratch.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info_span, Instrument};

use super::collector::{collect, DocumentSource};
use super::differ::{diff, inventory_namespaces};
use super::error::{Result, SyncError, TenantSyncResult};
use super::executor::{apply, ApplyReport};
use super::packer::pack;
use super::transformer::transform;
use crate::gitops::resource::RulesTenantResource;
use crate::rules::NamespaceKey;
use crate::sanitize::redact_url;
use crate::ruler::{resolve_credentials, BackendFactory, RulerBackend, RulerSettings, RulerTarget};
use crate::secrets::SecretStore;
use crate::status::StatusSink;

/// Lifecycle phase of a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TenantPhase {
    Active,
    Deleting,
    /// Terminal: the tenant's remote namespaces are gone.
    Removed,
}

impl TenantPhase {
    /// Phase a tenant enters a pass in.
    pub fn observe(marked_for_deletion: bool) -> Self {
        if marked_for_deletion {
            TenantPhase::Deleting
        } else {
            TenantPhase::Active
        }
    }

    /// Phase after a pass that ended with `result`.
    pub fn next(self, result: &TenantSyncResult) -> Self {
        match (self, result) {
            (TenantPhase::Deleting, TenantSyncResult::Synced) => TenantPhase::Removed,
            (phase, _) => phase,
        }
    }
}

impl std::fmt::Display for TenantPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TenantPhase::Active => write!(f, "active"),
            TenantPhase::Deleting => write!(f, "deleting"),
            TenantPhase::Removed => write!(f, "removed"),
        }
    }
}

/// What a single pass did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileOutcome {
    /// Tenant key (`namespace/name` of the tenant resource).
    pub tenant: String,
    /// Phase after the pass.
    pub phase: TenantPhase,
    pub result: TenantSyncResult,
    /// Remote calls made, when the pass succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ApplyReport>,
}

/// Runs passes for tenants against their remote rulers.
///
/// Holds no per-tenant state; everything a pass needs is read from the tenant
/// resource and the collaborators, so passes for different tenants can run
/// concurrently on one reconciler.
pub struct TenantReconciler<'a> {
    pool: &'a dyn DocumentSource,
    backends: &'a dyn BackendFactory,
    secrets: &'a dyn SecretStore,
    status: &'a dyn StatusSink,
    settings: &'a RulerSettings,
}

impl<'a> TenantReconciler<'a> {
    pub fn new(
        pool: &'a dyn DocumentSource,
        backends: &'a dyn BackendFactory,
        secrets: &'a dyn SecretStore,
        status: &'a dyn StatusSink,
        settings: &'a RulerSettings,
    ) -> Self {
        Self {
            pool,
            backends,
            secrets,
            status,
            settings,
        }
    }

    /// Runs one pass for `tenant` and reports it to the status sink.
    pub async fn reconcile(&self, tenant: &RulesTenantResource) -> ReconcileOutcome {
        let key = tenant.key();
        let phase = TenantPhase::observe(tenant.is_marked_for_deletion());
        let span = info_span!(
            "tenant_pass",
            tenant = %key,
            id = %tenant.spec.id,
            url = %redact_url(&tenant.spec.url),
            phase = %phase
        );

        let pass = async {
            let outcome = match phase {
                TenantPhase::Deleting => self.deletion_pass(tenant).await,
                _ => self.sync_pass(tenant).await,
            };
            if let Err(e) = &outcome {
                if e.is_configuration() {
                    log::error!("Tenant '{}' is misconfigured: {}", key, e);
                } else {
                    log::warn!("Pass for tenant '{}' failed: {}", key, e);
                }
            }
            outcome
        };
        let outcome = pass.instrument(span).await;

        let result = TenantSyncResult::from(&outcome);
        let next = phase.next(&result);
        self.status.report(&key, next, &result);

        if next != phase {
            log::info!("Tenant '{}' moved from {} to {}", key, phase, next);
        }

        ReconcileOutcome {
            tenant: key,
            phase: next,
            result,
            report: outcome.ok(),
        }
    }

    /// Collect, transform, pack, diff and apply.
    async fn sync_pass(&self, tenant: &RulesTenantResource) -> Result<ApplyReport> {
        let spec = &tenant.spec;
        let backend = self.connect(tenant)?;

        let desired = {
            let _step = info_span!("build_desired").entered();
            let documents = collect(&spec.rules.selectors, self.pool)?;
            let transformed = transform(&documents, &spec.overrides, &spec.external_labels);
            pack(&transformed)?
        };

        let keys: BTreeSet<NamespaceKey> = desired.keys().cloned().collect();
        let stale = diff(&keys, backend.as_ref()).await?;
        let report = apply(&desired, &stale, backend.as_ref()).await?;

        log::info!(
            "Tenant '{}' synced: {} namespace(s) submitted, {} deleted",
            tenant.key(),
            report.submitted,
            report.deleted
        );
        Ok(report)
    }

    /// Deletes every namespace the tenant holds remotely.
    async fn deletion_pass(&self, tenant: &RulesTenantResource) -> Result<ApplyReport> {
        let backend = self.connect(tenant)?;

        let inventory = backend
            .list_rule_groups()
            .await
            .map_err(SyncError::RemoteList)?;
        let namespaces = inventory_namespaces(&inventory);
        log::info!(
            "Deleting {} namespace(s) of tenant '{}'",
            namespaces.len(),
            tenant.key()
        );

        apply(&BTreeMap::new(), &namespaces, backend.as_ref()).await
    }

    /// Resolves credentials and builds the tenant's backend. Runs every pass
    /// so rotated secrets take effect without a restart.
    fn connect(&self, tenant: &RulesTenantResource) -> Result<Box<dyn RulerBackend>> {
        let spec = &tenant.spec;
        let credentials = resolve_credentials(spec.auth.as_ref(), self.secrets)?;
        log::debug!(
            "Using {} credentials for tenant '{}'",
            credentials.scheme(),
            tenant.key()
        );

        let target = RulerTarget {
            tenant_id: spec.id.clone(),
            url: spec.url.clone(),
            credentials,
        };
        self.backends
            .backend(self.settings, target)
            .map_err(SyncError::Backend)
    }
}
