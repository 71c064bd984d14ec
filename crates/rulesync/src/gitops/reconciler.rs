//! Config reconciler: load → reconcile every tenant → persist status.
//!
//! One call is one cycle. The config directory is re-read each cycle, so
//! edits, new tenants and deletion markers take effect on the next trigger.

use futures_util::future::join_all;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::error::Result;
use super::loader::ConfigLoader;
use crate::ruler::BackendFactory;
use crate::secrets::MountedSecretStore;
use crate::status::{StatusBoard, StatusSink};
use crate::sync::{ReconcileOutcome, TenantPhase, TenantReconciler};

/// Result of a reconciliation cycle.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    /// True if the cycle did not run because another one was in progress.
    pub skipped: bool,
    /// One outcome per tenant, in tenant key order.
    pub tenants: Vec<ReconcileOutcome>,
    /// Tenants whose resource file was deleted after a completed removal.
    pub removed: Vec<String>,
}

impl CycleReport {
    /// Number of tenants whose pass failed.
    pub fn failed(&self) -> usize {
        self.tenants
            .iter()
            .filter(|t| !t.result.is_synced())
            .count()
    }
}

/// Reconciles every tenant in the config directory against its ruler.
///
/// Uses a mutex so overlapping triggers coalesce into the running cycle.
pub struct ConfigReconciler {
    loader: ConfigLoader,
    backends: Arc<dyn BackendFactory>,
    status: Arc<StatusBoard>,
    /// Prevents concurrent cycles from interleaving passes of one tenant.
    reconcile_lock: Mutex<()>,
}

impl ConfigReconciler {
    /// Creates a new reconciler.
    pub fn new(
        loader: ConfigLoader,
        backends: Arc<dyn BackendFactory>,
        status: Arc<StatusBoard>,
    ) -> Self {
        Self {
            loader,
            backends,
            status,
            reconcile_lock: Mutex::new(()),
        }
    }

    /// Returns the config loader.
    pub fn loader(&self) -> &ConfigLoader {
        &self.loader
    }

    /// Returns the status board the cycles report to.
    pub fn status(&self) -> &Arc<StatusBoard> {
        &self.status
    }

    /// Runs one cycle.
    ///
    /// Returns early if another cycle is already in progress. Fails only if
    /// the config directory cannot be loaded; tenant failures are recorded in
    /// the report and on the status board.
    pub async fn reconcile(&self) -> Result<CycleReport> {
        // Try to acquire the lock; skip if already reconciling
        let _guard = match self.reconcile_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                log::info!("Reconcile skipped: another cycle is already in progress");
                return Ok(CycleReport {
                    skipped: true,
                    ..Default::default()
                });
            }
        };

        let config = self.loader.load()?;
        let settings = config.settings();
        let secrets = MountedSecretStore::new(self.loader.resolve_path(&settings.secrets_dir));

        log::info!(
            "Reconciling {} tenant(s) against {} rule document(s)",
            config.tenants.len(),
            config.rules.len()
        );

        let tenants = {
            let reconciler = TenantReconciler::new(
                &config,
                self.backends.as_ref(),
                &secrets,
                self.status.as_ref(),
                &settings.ruler,
            );
            join_all(
                config
                    .tenants
                    .iter()
                    .map(|tenant| reconciler.reconcile(&tenant.resource)),
            )
            .await
        };

        let mut removed = Vec::new();
        for outcome in tenants.iter().filter(|o| o.phase == TenantPhase::Removed) {
            let Some(tenant) = config
                .tenants
                .iter()
                .find(|t| t.resource.key() == outcome.tenant)
            else {
                continue;
            };
            // If the file survives, the next cycle runs another (empty) deletion pass.
            match self.loader.delete_resource(&tenant.path) {
                Ok(()) => {
                    log::info!(
                        "Removed tenant '{}' ({})",
                        outcome.tenant,
                        tenant.path.display()
                    );
                    self.status.forget(&outcome.tenant);
                    removed.push(outcome.tenant.clone());
                }
                Err(e) => log::warn!("Failed to remove tenant file for '{}': {}", outcome.tenant, e),
            }
        }

        // Tenants whose file was deleted by hand drop off the board as well.
        let known: BTreeSet<String> = config.tenants.iter().map(|t| t.resource.key()).collect();
        for tenant in self.status.snapshot().keys() {
            if !known.contains(tenant) {
                self.status.forget(tenant);
            }
        }

        if let Some(status_file) = &settings.status_file {
            let path = self.loader.resolve_path(status_file);
            if let Err(e) = self.status.write_json(&path) {
                log::warn!("Failed to write status file {}: {}", path.display(), e);
            }
        }

        let report = CycleReport {
            skipped: false,
            tenants,
            removed,
        };
        log::info!(
            "Cycle finished: {} tenant(s), {} failed, {} removed",
            report.tenants.len(),
            report.failed(),
            report.removed.len()
        );
        Ok(report)
    }
}
