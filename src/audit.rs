/// Audit logging for every rule operation
///
/// Each attempted operation (success, failure, validation rejection or
/// cancellation) appends exactly one line:
///
/// ```text
/// [2026-10-18 10:02:11] Add rule: block 10.0.0.5 port 22 tcp -> Rule added
/// [2026-10-18 10:02:40] Delete rule error: index 7: Rule index 7 out of range (rule count: 3)
/// ```
///
/// Writes never fail the operation being audited; a failed write is reported
/// through `tracing` and dropped.
use chrono::{DateTime, Local};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Auditable operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Operation {
    #[strum(serialize = "Add rule")]
    AddRule,
    #[strum(serialize = "Delete rule")]
    DeleteRule,
    #[strum(serialize = "Refresh rules")]
    ListRules,
    #[strum(serialize = "Export rules")]
    ExportRules,
    #[strum(serialize = "Export logs")]
    ExportLogs,
    #[strum(serialize = "Check traffic")]
    CheckTraffic,
    #[strum(serialize = "Show stats")]
    ShowStats,
}

/// How an audited operation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// Store, dependency or backend failure
    Failure,
    /// Input failed validation; nothing external was touched
    Rejected,
    /// The operation future was dropped before it finished
    Cancelled,
}

impl Outcome {
    const fn suffix(self) -> &'static str {
        match self {
            Outcome::Success => "",
            Outcome::Failure => " error",
            Outcome::Rejected => " rejected",
            Outcome::Cancelled => " cancelled",
        }
    }
}

/// A single audit log entry
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub timestamp: DateTime<Local>,
    pub operation: Operation,
    pub outcome: Outcome,
    pub detail: String,
}

impl AuditEntry {
    pub fn new(operation: Operation, outcome: Outcome, detail: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            operation,
            outcome,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for AuditEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Keep one entry per line whatever the backend printed
        let detail = self.detail.replace(['\r', '\n'], " ");
        write!(
            f,
            "[{}] {}{}: {}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.operation,
            self.outcome.suffix(),
            detail
        )
    }
}

/// Audit log writer
#[derive(Debug, Clone)]
pub struct AuditLog {
    log_path: PathBuf,
}

impl AuditLog {
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
        }
    }

    /// Appends an entry. Never fails; write errors are logged and dropped.
    pub async fn record(&self, entry: AuditEntry) {
        if let Err(e) = self.append(&entry).await {
            tracing::warn!("Failed to write audit log {}: {}", self.log_path.display(), e);
        }
    }

    async fn append(&self, entry: &AuditEntry) -> std::io::Result<()> {
        let line = format!("{entry}\n");

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .await?;

        // One write per line so concurrent writers never interleave within a line
        file.write_all(line.as_bytes()).await?;
        file.sync_all().await?;

        Ok(())
    }

    /// Starts an audited operation.
    ///
    /// The returned guard must be finished with [`PendingAudit::finish`]; if it
    /// is dropped first, a `cancelled` entry is written on the spot.
    pub fn begin(&self, operation: Operation, attempted: impl Into<String>) -> PendingAudit {
        PendingAudit {
            log: self.clone(),
            operation,
            attempted: attempted.into(),
            outcome: None,
            written: false,
        }
    }

    /// Reads the most recent lines from the log, newest first
    ///
    /// # Errors
    ///
    /// Returns `Err` if the file cannot be read
    pub async fn read_recent(&self, count: usize) -> std::io::Result<Vec<String>> {
        let content = tokio::fs::read_to_string(&self.log_path).await?;

        Ok(content
            .lines()
            .rev()
            .filter(|line| !line.is_empty())
            .take(count)
            .map(String::from)
            .collect())
    }

    pub fn path(&self) -> &Path {
        &self.log_path
    }
}

/// Audit entry for an operation in flight
#[derive(Debug)]
pub struct PendingAudit {
    log: AuditLog,
    operation: Operation,
    attempted: String,
    /// Final entry, set once the outcome is known
    outcome: Option<AuditEntry>,
    written: bool,
}

impl PendingAudit {
    /// Replaces the description of what is being attempted
    pub fn set_attempted(&mut self, attempted: impl Into<String>) {
        self.attempted = attempted.into();
    }

    /// Writes the final entry: `<attempted> -> <result>`, or just the result
    /// when nothing specific was attempted.
    ///
    /// If this future is dropped before the line is handed to the file, the
    /// guard's `Drop` writes the same entry synchronously.
    pub async fn finish(mut self, outcome: Outcome, result: impl fmt::Display) {
        let detail = if self.attempted.is_empty() {
            result.to_string()
        } else {
            format!("{} -> {}", self.attempted, result)
        };
        let entry = AuditEntry::new(self.operation, outcome, detail);
        let line = format!("{entry}\n");
        self.outcome = Some(entry);

        if let Err(e) = self.write_final(&line).await {
            tracing::warn!(
                "Failed to write audit log {}: {}",
                self.log.log_path.display(),
                e
            );
        }
        self.written = true;
    }

    async fn write_final(&mut self, line: &str) -> std::io::Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log.log_path)
            .await?;

        file.write_all(line.as_bytes()).await?;
        // The write is in flight and completes even if we are dropped now
        self.written = true;
        file.sync_all().await
    }
}

impl Drop for PendingAudit {
    fn drop(&mut self) {
        if self.written {
            return;
        }

        let entry = self.outcome.take().unwrap_or_else(|| {
            let detail = if self.attempted.is_empty() {
                "did not complete".to_string()
            } else {
                format!("{} -> did not complete", self.attempted)
            };
            AuditEntry::new(self.operation, Outcome::Cancelled, detail)
        });

        // Cannot await in drop; this is a single small append
        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log.log_path)
            .and_then(|mut file| file.write_all(format!("{entry}\n").as_bytes()));

        if let Err(e) = result {
            tracing::warn!(
                "Failed to write audit log {}: {}",
                self.log.log_path.display(),
                e
            );
        }
    }
}
