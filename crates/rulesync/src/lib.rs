pub mod error;
pub mod gitops;
pub mod ruler;
pub mod rules;
pub mod sanitize;
pub mod secrets;
pub mod status;
pub mod sync;

pub use error::{Result, RulesyncError};
pub use gitops::{ConfigLoader, ConfigReconciler, CycleReport, LoadedConfig, SyncScheduler};
pub use ruler::{BackendFactory, DefaultBackendFactory, RulerBackend, RulerError, RulerSettings};
pub use rules::{LabelSelector, RuleDocument, Selector};
pub use secrets::{MountedSecretStore, SecretError, SecretStore};
pub use status::{StatusBoard, StatusSink, TenantStatus};
pub use sync::{ReconcileOutcome, SyncError, TenantPhase, TenantReconciler, TenantSyncResult};
