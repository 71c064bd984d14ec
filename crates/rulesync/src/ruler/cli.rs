//! `mimirtool` subprocess backend.

use async_trait::async_trait;
use reqwest::Url;
use secrecy::ExposeSecret;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command as TokioCommand;

use super::auth::Credentials;
use super::error::{classify_tool_error, RulerError};
use super::{Result, RulerBackend, RulerSettings, RulerTarget};
use crate::rules::{RuleGroup, RuleGroupRef, SerializedRuleGroups};
use crate::sanitize::{redact_args, redact_url};

const ADDRESS_FLAG: &str = "--address=";
const TENANT_FLAG: &str = "--id=";
const NAMESPACE_FLAG: &str = "--namespaces=";
const TOKEN_FLAG: &str = "--auth-token";
const USER_FLAG: &str = "--user";
const KEY_FLAG: &str = "--key";

/// RAII guard for a staged rule file.
///
/// Deletes the file when dropped so rule files never accumulate in the
/// staging directory, even when the tool call fails.
struct StagedRuleFile {
    path: PathBuf,
}

impl StagedRuleFile {
    /// Writes `content` to a new, uniquely named file under `dir`.
    fn create(dir: &Path, content: &str) -> Result<Self> {
        let path = dir.join(format!("rulesync-{}.yaml", uuid::Uuid::new_v4()));
        let stage_err = |source| RulerError::StageFile {
            path: path.clone(),
            source,
        };

        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            let mut file = std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .mode(0o600)
                .open(&path)
                .map_err(stage_err)?;
            std::io::Write::write_all(&mut file, content.as_bytes()).map_err(stage_err)?;
        }

        #[cfg(not(unix))]
        {
            std::fs::write(&path, content).map_err(stage_err)?;
        }

        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagedRuleFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            log::warn!("Failed to clean up staged rule file: {}", e);
        }
    }
}

/// A mimirtool rule file: the namespace followed by its groups.
#[derive(Serialize)]
struct RuleFile<'a> {
    namespace: &'a str,
    groups: &'a [RuleGroup],
}

/// Ruler backend that drives the `mimirtool` CLI.
pub struct MimirtoolRuler {
    program: PathBuf,
    address: String,
    tenant_id: String,
    credentials: Credentials,
    timeout: Duration,
    staging_dir: PathBuf,
}

impl MimirtoolRuler {
    pub fn new(settings: &RulerSettings, target: RulerTarget) -> Result<Self> {
        Url::parse(&target.url).map_err(|e| RulerError::InvalidAddress {
            address: redact_url(&target.url),
            reason: e.to_string(),
        })?;

        Ok(Self {
            program: settings.mimirtool_path.clone(),
            address: target.url,
            tenant_id: target.tenant_id,
            credentials: target.credentials,
            timeout: Duration::from_secs(settings.command_timeout),
            staging_dir: std::env::temp_dir(),
        })
    }

    /// Stages rule files under `dir` instead of the system temp directory.
    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = dir.into();
        self
    }

    fn auth_args(&self) -> Vec<String> {
        match &self.credentials {
            Credentials::Anonymous => Vec::new(),
            Credentials::Bearer(token) => {
                vec![TOKEN_FLAG.to_string(), token.expose_secret().to_string()]
            }
            Credentials::Basic { user, key } => vec![
                USER_FLAG.to_string(),
                user.clone(),
                KEY_FLAG.to_string(),
                key.expose_secret().to_string(),
            ],
        }
    }

    /// Runs mimirtool and returns its stdout.
    ///
    /// The command line is logged before auth arguments are appended.
    async fn run(&self, args: &[String]) -> Result<String> {
        log::info!("Running {} {}", self.program.display(), redact_args(args));

        let mut cmd = TokioCommand::new(&self.program);
        cmd.args(args)
            .args(self.auth_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| RulerError::Spawn {
            program: self.program.display().to_string(),
            source: e,
        })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| RulerError::Spawn {
                program: self.program.display().to_string(),
                source: e,
            })?,
            Err(_) => return Err(RulerError::Timeout(self.timeout.as_secs())),
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if output.status.success() {
            return Ok(stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let message = match (stderr.trim().is_empty(), stdout.trim().is_empty()) {
            (true, true) => format!(
                "Command failed with exit code {}",
                output.status.code().unwrap_or(-1)
            ),
            (false, _) => stderr.to_string(),
            (true, false) => stdout,
        };
        Err(classify_tool_error(&message))
    }

    fn base_args(&self, command: &str) -> Vec<String> {
        vec![
            "rules".to_string(),
            command.to_string(),
            format!("{}{}", ADDRESS_FLAG, self.address),
            format!("{}{}", TENANT_FLAG, self.tenant_id),
        ]
    }

    /// `rules sync` limited to `namespace`; an empty file removes the namespace.
    async fn sync(&self, namespace: &str, content: &str) -> Result<()> {
        let staged = StagedRuleFile::create(&self.staging_dir, content)?;

        let mut args = self.base_args("sync");
        args.push(format!("{}{}", NAMESPACE_FLAG, namespace));
        args.push(staged.path().display().to_string());

        let stdout = self.run(&args).await?;
        if !stdout.trim().is_empty() {
            log::debug!("mimirtool: {}", stdout.trim());
        }
        Ok(())
    }
}

#[async_trait]
impl RulerBackend for MimirtoolRuler {
    async fn list_rule_groups(&self) -> Result<Vec<RuleGroupRef>> {
        let mut args = self.base_args("list");
        args.push("--format=json".to_string());
        args.push("--disable-color".to_string());

        let stdout = self.run(&args).await?;
        let trimmed = stdout.trim();
        if trimmed.is_empty() || trimmed == "null" {
            return Ok(Vec::new());
        }
        serde_json::from_str(trimmed).map_err(|e| RulerError::Parse(e.to_string()))
    }

    async fn submit_groups(&self, namespace: &str, groups: &SerializedRuleGroups) -> Result<()> {
        if groups.is_empty() {
            return self.delete_namespace(namespace).await;
        }

        let decoded = groups
            .decode()
            .map_err(|e| RulerError::Parse(e.to_string()))?;
        let content = serde_yaml::to_string(&RuleFile {
            namespace,
            groups: &decoded.groups,
        })
        .map_err(|e| RulerError::Parse(e.to_string()))?;

        self.sync(namespace, &content).await
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<()> {
        self.sync(namespace, "").await
    }
}
