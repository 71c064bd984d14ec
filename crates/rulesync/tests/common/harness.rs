//! Config directory fixtures.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use assert_fs::prelude::*;
use assert_fs::TempDir;

/// An isolated config directory with helpers for writing resources.
pub struct TestHarness {
    temp_dir: TempDir,
}

impl TestHarness {
    /// Creates an empty config directory.
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Path of the config directory.
    pub fn config_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `content` at `relative` inside the config directory.
    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        let file = self.temp_dir.child(relative);
        file.write_str(content).expect("Failed to write fixture");
        file.path().to_path_buf()
    }

    pub fn write_settings(&self, spec: &str) -> PathBuf {
        self.write(
            "settings.yaml",
            &format!(
                "apiVersion: rulesync.io/v1\nkind: Settings\nmetadata:\n  name: default\nspec:\n{}",
                indent(spec, 2)
            ),
        )
    }

    /// Writes a `RulesTenant` in namespace `monitoring`.
    pub fn write_tenant(&self, name: &str, spec: &str) -> PathBuf {
        self.write(
            &format!("tenants/{name}.yaml"),
            &format!(
                "apiVersion: rulesync.io/v1\nkind: RulesTenant\nmetadata:\n  name: {name}\n  namespace: monitoring\nspec:\n{}",
                indent(spec, 2)
            ),
        )
    }

    /// Marks a tenant for deletion by rewriting its metadata.
    pub fn mark_tenant_deleted(&self, name: &str) {
        let path = self.temp_dir.child(format!("tenants/{name}.yaml"));
        let content = std::fs::read_to_string(path.path()).expect("Failed to read tenant");
        let marked = content.replace(
            "  namespace: monitoring\n",
            "  namespace: monitoring\n  deletionTimestamp: \"2026-03-01T12:00:00Z\"\n",
        );
        path.write_str(&marked).expect("Failed to write tenant");
    }

    /// Writes a `PrometheusRule` with the given labels and groups.
    pub fn write_rule(&self, namespace: &str, name: &str, labels: &[(&str, &str)], groups: &str) -> PathBuf {
        let labels: String = if labels.is_empty() {
            String::new()
        } else {
            labels
                .iter()
                .map(|(k, v)| format!("    {k}: {v}\n"))
                .fold("  labels:\n".to_string(), |acc, line| acc + &line)
        };
        self.write(
            &format!("rules/{namespace}/{name}.yaml"),
            &format!(
                "apiVersion: monitoring.coreos.com/v1\nkind: PrometheusRule\nmetadata:\n  name: {name}\n  namespace: {namespace}\n{labels}spec:\n  groups:\n{}",
                indent(groups, 4)
            ),
        )
    }

    /// Writes a mounted secret value.
    pub fn write_secret(&self, name: &str, key: &str, value: &str) -> PathBuf {
        self.write(&format!("secrets/{name}/{key}"), value)
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.temp_dir.child(relative).path().exists()
    }
}

fn indent(text: &str, width: usize) -> String {
    let pad = " ".repeat(width);
    text.trim_matches('\n')
        .lines()
        .map(|line| {
            if line.is_empty() {
                "\n".to_string()
            } else {
                format!("{pad}{line}\n")
            }
        })
        .collect()
}
