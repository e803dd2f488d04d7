//! Enforcement gateway
//!
//! Translates validated requests into invocations of the backend scripts and
//! normalizes their results. Before every call the gateway re-checks that
//! the JSON tool and the required scripts are present and executable, since
//! the environment may change between calls; a failed check means the
//! backend is never started.
//!
//! | Operation       | Script       | Arguments                              |
//! |-----------------|--------------|----------------------------------------|
//! | `add_rule`      | rule manager | `add_rule action ip port protocol`     |
//! | `delete_rule`   | rule manager | `delete_rule index`                    |
//! | `export_rules`  | rule manager | `export_rules`                         |
//! | `export_logs`   | logger       | `export_logs`                          |
//! | `check_traffic` | firewall     | `ip port protocol`                     |
//! | `show_stats`    | logger       | `show_stats`                           |

use crate::config::AppConfig;
use crate::core::error::{Dependency, Error, ExitInfo, Result};
use crate::core::rule::{EnforcementRequest, Rule};
use crate::core::runner::ProcessRunner;
use crate::utils::{find_executable, is_executable};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Placeholder used when a failing backend printed nothing
pub const NO_DETAILS: &str = "No error details provided.";

/// A backend operation with its validated arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendOp {
    AddRule(Rule),
    DeleteRule(usize),
    ExportRules,
    ExportLogs,
    CheckTraffic(EnforcementRequest),
    ShowStats,
}

impl BackendOp {
    pub const fn name(&self) -> &'static str {
        match self {
            BackendOp::AddRule(_) => "add_rule",
            BackendOp::DeleteRule(_) => "delete_rule",
            BackendOp::ExportRules => "export_rules",
            BackendOp::ExportLogs => "export_logs",
            BackendOp::CheckTraffic(_) => "check_traffic",
            BackendOp::ShowStats => "show_stats",
        }
    }

    /// Full argument vector in backend order
    ///
    /// The firewall script takes its query positionally, with no operation name.
    pub fn args(&self) -> Vec<String> {
        let name = self.name().to_string();
        match self {
            BackendOp::AddRule(rule) => {
                let mut args = vec![name];
                args.extend(rule.backend_args());
                args
            }
            BackendOp::DeleteRule(index) => vec![name, index.to_string()],
            BackendOp::CheckTraffic(request) => request.backend_args(),
            BackendOp::ExportRules | BackendOp::ExportLogs | BackendOp::ShowStats => vec![name],
        }
    }
}

/// Backend script that serves an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Script {
    RuleManager,
    Firewall,
    Logger,
}

impl Script {
    /// Scripts an operation needs; the first one is invoked
    fn required_for(op: &BackendOp) -> &'static [Script] {
        match op {
            BackendOp::AddRule(_) | BackendOp::DeleteRule(_) | BackendOp::ExportRules => {
                &[Script::RuleManager]
            }
            BackendOp::ExportLogs | BackendOp::ShowStats => &[Script::Logger],
            // firewall.sh reports through logger.sh
            BackendOp::CheckTraffic(_) => &[Script::Firewall, Script::Logger],
        }
    }
}

/// Invokes the enforcement backend through a [`ProcessRunner`]
#[derive(Debug)]
pub struct Gateway<R> {
    rule_manager: PathBuf,
    firewall: PathBuf,
    logger: PathBuf,
    json_tool: String,
    timeout: Option<Duration>,
    runner: R,
}

impl<R: ProcessRunner> Gateway<R> {
    pub fn new(config: &AppConfig, runner: R) -> Self {
        Self {
            rule_manager: config.rule_manager_path(),
            firewall: config.firewall_path(),
            logger: config.logger_path(),
            json_tool: config.json_tool.clone(),
            timeout: config.backend_timeout(),
            runner,
        }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    fn script_path(&self, script: Script) -> &Path {
        match script {
            Script::RuleManager => &self.rule_manager,
            Script::Firewall => &self.firewall,
            Script::Logger => &self.logger,
        }
    }

    /// Checks the JSON tool, then every script `op` needs.
    ///
    /// # Errors
    ///
    /// Returns `DependencyMissing` naming the first unmet prerequisite.
    pub fn check_dependencies(&self, op: &BackendOp) -> Result<()> {
        if find_executable(&self.json_tool).is_none() {
            return Err(Error::DependencyMissing {
                which: Dependency::JsonTool(self.json_tool.clone()),
            });
        }

        for &script in Script::required_for(op) {
            let path = self.script_path(script);
            if !path.is_file() {
                return Err(Error::DependencyMissing {
                    which: Dependency::ScriptNotFound(path.to_path_buf()),
                });
            }
            if !is_executable(path) {
                return Err(Error::DependencyMissing {
                    which: Dependency::ScriptNotExecutable(path.to_path_buf()),
                });
            }
        }

        Ok(())
    }

    /// Runs `op` on the backend and returns its trimmed output.
    ///
    /// # Errors
    ///
    /// - `DependencyMissing` if a precondition fails (backend not started)
    /// - `BackendUnavailable` if the process could not be started
    /// - `BackendTimeout` if the configured timeout elapsed
    /// - `BackendError` if the process exited non-zero
    pub async fn call(&self, op: &BackendOp) -> Result<String> {
        self.check_dependencies(op)?;

        let program = self.script_path(Script::required_for(op)[0]);
        let args = op.args();

        info!("Invoking backend {} ({})", op.name(), program.display());
        let output = self.runner.run(program, &args, self.timeout).await?;

        if output.success {
            info!("Backend {} succeeded", op.name());
            Ok(output.output)
        } else {
            let exit = ExitInfo { code: output.code };
            warn!("Backend {} failed with {}: {}", op.name(), exit, output.output);
            let output = if output.output.is_empty() {
                NO_DETAILS.to_string()
            } else {
                output.output
            };
            Err(Error::BackendError { exit, output })
        }
    }
}
