//! Per-tenant sync status.
//!
//! The tenant reconciler reports every pass to a [`StatusSink`]. The daemon
//! uses a [`StatusBoard`], which keeps the latest state of each tenant in
//! memory and can persist a JSON snapshot after each cycle.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use crate::sync::{TenantPhase, TenantSyncResult};

/// Receives the outcome of each tenant pass.
pub trait StatusSink: Send + Sync {
    /// Records the result of a pass for `tenant`.
    fn report(&self, tenant: &str, phase: TenantPhase, result: &TenantSyncResult);

    /// Drops everything known about `tenant`.
    fn forget(&self, tenant: &str);
}

/// Status of a single tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantStatus {
    pub phase: TenantPhase,
    pub last_result: TenantSyncResult,
    /// Reason of the most recent failure; cleared by the next success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// When the phase or result last changed.
    pub last_transition: DateTime<Utc>,
    pub consecutive_failures: u32,
}

/// In-memory [`StatusSink`].
#[derive(Debug, Default)]
pub struct StatusBoard {
    tenants: Mutex<BTreeMap<String, TenantStatus>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the status of `tenant`, if it has been reported.
    pub fn get(&self, tenant: &str) -> Option<TenantStatus> {
        self.lock().get(tenant).cloned()
    }

    /// Returns a copy of every tenant's status, keyed by tenant.
    pub fn snapshot(&self) -> BTreeMap<String, TenantStatus> {
        self.lock().clone()
    }

    /// Number of tenants whose last pass failed.
    pub fn failed_count(&self) -> usize {
        self.lock()
            .values()
            .filter(|s| !s.last_result.is_synced())
            .count()
    }

    /// Writes the snapshot as pretty JSON, creating parent directories.
    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(&self.snapshot())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, json)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, TenantStatus>> {
        // A panic while holding the lock cannot leave a half-written entry.
        self.tenants.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl StatusSink for StatusBoard {
    fn report(&self, tenant: &str, phase: TenantPhase, result: &TenantSyncResult) {
        let now = Utc::now();
        let mut tenants = self.lock();

        match tenants.get_mut(tenant) {
            Some(status) => {
                if status.phase != phase || status.last_result != *result {
                    status.last_transition = now;
                }
                status.phase = phase;
                status.last_result = result.clone();
                match result.reason() {
                    Some(reason) => {
                        status.last_error = Some(reason.to_string());
                        status.consecutive_failures += 1;
                    }
                    None => {
                        status.last_error = None;
                        status.consecutive_failures = 0;
                    }
                }
            }
            None => {
                tenants.insert(
                    tenant.to_string(),
                    TenantStatus {
                        phase,
                        last_result: result.clone(),
                        last_error: result.reason().map(str::to_string),
                        last_transition: now,
                        consecutive_failures: u32::from(!result.is_synced()),
                    },
                );
            }
        }
    }

    fn forget(&self, tenant: &str) {
        self.lock().remove(tenant);
    }
}
