//! Shared test utilities for core module tests
//!
//! Provides a scratch backend directory so tests never touch a real
//! firewall. This module is only compiled in test mode.

use crate::config::AppConfig;
use crate::core::manager::RuleManager;
use crate::core::runner::RecordingRunner;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/// A temporary base directory holding executable stand-ins for the three
/// backend scripts and the JSON tool, plus an empty `rules.json`.
///
/// The scripts only `exit 0`; tests that care about backend behaviour pair
/// the fixture with a [`RecordingRunner`].
pub struct BackendFixture {
    pub dir: tempfile::TempDir,
    pub config: AppConfig,
}

impl BackendFixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::with_base_dir(dir.path());

        for script in ["rule_manager.sh", "firewall.sh", "logger.sh", "jq"] {
            write_executable(&dir.path().join(script), "#!/bin/sh\nexit 0\n");
        }
        config.json_tool = dir.path().join("jq").to_string_lossy().into_owned();

        std::fs::write(config.rules_path(), "[]\n").unwrap();

        Self { dir, config }
    }

    pub fn write_rules(&self, json: &str) {
        std::fs::write(self.config.rules_path(), json).unwrap();
    }

    pub fn make_non_executable(&self, path: &Path) {
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o644)).unwrap();
    }

    /// Audit log lines, oldest first
    pub fn audit_lines(&self) -> Vec<String> {
        std::fs::read_to_string(self.config.audit_log_path())
            .map(|content| content.lines().map(String::from).collect())
            .unwrap_or_default()
    }

    /// Manager wired to a fresh [`RecordingRunner`]
    pub fn manager(&self) -> RuleManager<RecordingRunner> {
        RuleManager::with_runner(&self.config, RecordingRunner::new())
    }
}

pub fn write_executable(path: &Path, body: &str) {
    std::fs::write(path, body).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}
