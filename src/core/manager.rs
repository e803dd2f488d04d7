//! Rule manager: the public face of the core
//!
//! Every operation is a short, independent transaction:
//! validate → read the store and/or call the gateway → audit → respond.
//! Nothing is cached between operations; the rule document is re-read each
//! time it matters. Every attempt leaves exactly one audit line, including
//! validation rejections and operations whose future is dropped mid-flight.
//!
//! Mutating operations take an in-process lock. Serializing concurrent
//! writes from *other* processes is left to the backend scripts.

use crate::audit::{AuditLog, Operation, Outcome, PendingAudit};
use crate::config::AppConfig;
use crate::core::error::{Error, Result};
use crate::core::gateway::{BackendOp, Gateway};
use crate::core::rule::{EnforcementRequest, Rule, TrafficReport};
use crate::core::runner::{ProcessRunner, TokioRunner};
use crate::core::store::RuleStore;
use crate::validators::validate_index;
use tokio::sync::Mutex;
use tracing::warn;

/// Raw rule fields as typed by a user
#[derive(Debug, Clone, Default)]
pub struct RuleInput {
    pub action: String,
    pub ip: String,
    pub port: String,
    pub protocol: String,
}

impl RuleInput {
    pub fn new(action: &str, ip: &str, port: &str, protocol: &str) -> Self {
        Self {
            action: action.to_string(),
            ip: ip.to_string(),
            port: port.to_string(),
            protocol: protocol.to_string(),
        }
    }
}

impl std::fmt::Display for RuleInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "action={:?} ip={:?} port={:?} protocol={:?}",
            self.action, self.ip, self.port, self.protocol
        )
    }
}

/// Raw traffic query fields; an empty protocol means all protocols
#[derive(Debug, Clone, Default)]
pub struct TrafficQuery {
    pub ip: String,
    pub port: String,
    pub protocol: String,
}

pub struct RuleManager<R = TokioRunner> {
    store: RuleStore,
    gateway: Gateway<R>,
    audit: AuditLog,
    mutation_lock: Mutex<()>,
}

impl RuleManager<TokioRunner> {
    /// Manager invoking the real backend scripts
    pub fn from_config(config: &AppConfig) -> Self {
        Self::with_runner(config, TokioRunner)
    }
}

impl<R: ProcessRunner> RuleManager<R> {
    pub fn with_runner(config: &AppConfig, runner: R) -> Self {
        Self {
            store: RuleStore::new(config.rules_path()),
            gateway: Gateway::new(config, runner),
            audit: AuditLog::new(config.audit_log_path()),
            mutation_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &RuleStore {
        &self.store
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    pub fn runner(&self) -> &R {
        self.gateway.runner()
    }

    /// Validates and adds a rule through the backend.
    ///
    /// The store is not assumed to reflect the change until the next
    /// [`list_rules`](Self::list_rules). Identical calls are not
    /// deduplicated.
    pub async fn add_rule(&self, input: &RuleInput) -> Result<String> {
        let mut audit = self.audit.begin(Operation::AddRule, input.to_string());

        let rule = match Rule::new(&input.action, &input.ip, &input.port, &input.protocol) {
            Ok(rule) => rule,
            Err(e) => {
                warn!("Rejected add rule: {e}");
                audit.finish(Outcome::Rejected, &e).await;
                return Err(e);
            }
        };
        audit.set_attempted(rule.to_string());

        let _guard = self.mutation_lock.lock().await;
        let result = self.gateway.call(&BackendOp::AddRule(rule)).await;
        finish(audit, &result).await;
        result
    }

    /// Deletes the rule at `index` through the backend.
    ///
    /// The index is checked against a fresh read of the store, never a
    /// cached listing. If `expected` is given, the rule currently at `index`
    /// must equal it, otherwise `SelectionChanged` is returned and nothing is
    /// deleted.
    pub async fn delete_rule(&self, index: i64, expected: Option<&Rule>) -> Result<String> {
        let mut audit = self.audit.begin(Operation::DeleteRule, format!("index {index}"));
        let _guard = self.mutation_lock.lock().await;

        let rules = match self.store.list().await {
            Ok(rules) => rules,
            Err(e) => {
                audit.finish(Outcome::Failure, &e).await;
                return Err(e);
            }
        };

        let position = match validate_index(index, rules.len()) {
            Ok(position) => position,
            Err(e) => {
                audit.finish(Outcome::Rejected, &e).await;
                return Err(e);
            }
        };

        let current = &rules[position];
        if let Some(expected) = expected
            && expected != current
        {
            let e = Error::SelectionChanged { index: position };
            warn!("Refusing delete: expected '{expected}', found '{current}'");
            audit.finish(Outcome::Rejected, &e).await;
            return Err(e);
        }
        audit.set_attempted(format!("index {position} ({current})"));

        let result = self.gateway.call(&BackendOp::DeleteRule(position)).await;
        finish(audit, &result).await;
        result
    }

    /// Reads the current rules.
    ///
    /// A `StoreUnavailable` error means no rules are visible, not that zero
    /// rules are configured.
    pub async fn list_rules(&self) -> Result<Vec<Rule>> {
        let audit = self.audit.begin(Operation::ListRules, "");

        match self.store.list().await {
            Ok(rules) => {
                audit
                    .finish(Outcome::Success, format!("{} rules", rules.len()))
                    .await;
                Ok(rules)
            }
            Err(e) => {
                audit.finish(Outcome::Failure, &e).await;
                Err(e)
            }
        }
    }

    /// Asks the backend to export a snapshot of the current rules.
    pub async fn export_rules(&self) -> Result<String> {
        self.passthrough(Operation::ExportRules, BackendOp::ExportRules)
            .await
    }

    /// Asks the backend to export its logs.
    pub async fn export_logs(&self) -> Result<String> {
        self.passthrough(Operation::ExportLogs, BackendOp::ExportLogs)
            .await
    }

    /// Returns the backend's statistics text unchanged.
    pub async fn show_stats(&self) -> Result<String> {
        self.passthrough(Operation::ShowStats, BackendOp::ShowStats)
            .await
    }

    /// Forwards a traffic query to the backend.
    ///
    /// Empty backend output is reported as [`TrafficReport::NoData`].
    pub async fn check_traffic(&self, query: &TrafficQuery) -> Result<TrafficReport> {
        let mut audit = self.audit.begin(
            Operation::CheckTraffic,
            format!("ip={:?} port={:?} protocol={:?}", query.ip, query.port, query.protocol),
        );

        let request = match EnforcementRequest::new(&query.ip, &query.port, &query.protocol) {
            Ok(request) => request,
            Err(e) => {
                audit.finish(Outcome::Rejected, &e).await;
                return Err(e);
            }
        };
        audit.set_attempted(request.to_string());

        match self.gateway.call(&BackendOp::CheckTraffic(request)).await {
            Ok(output) => {
                let report = TrafficReport::from_output(output);
                let detail = match &report {
                    TrafficReport::NoData => "No output returned",
                    TrafficReport::Verdict(text) => text.as_str(),
                };
                audit.finish(Outcome::Success, detail).await;
                Ok(report)
            }
            Err(e) => {
                audit.finish(Outcome::Failure, &e).await;
                Err(e)
            }
        }
    }

    async fn passthrough(&self, operation: Operation, op: BackendOp) -> Result<String> {
        let audit = self.audit.begin(operation, "");
        let result = self.gateway.call(&op).await;
        finish(audit, &result).await;
        result
    }
}

/// Writes the closing audit entry for a gateway result
async fn finish(audit: PendingAudit, result: &Result<String>) {
    match result {
        Ok(output) => audit.finish(Outcome::Success, output).await,
        Err(e) => audit.finish(Outcome::Failure, e).await,
    }
}
