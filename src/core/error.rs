use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Input field a validation failure refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Field {
    Action,
    Ip,
    Port,
    Protocol,
}

/// External prerequisite of a backend call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dependency {
    /// JSON-processing tool (`jq`) not found or not executable
    JsonTool(String),
    /// Backend script does not exist
    ScriptNotFound(PathBuf),
    /// Backend script exists but lacks the execute bit
    ScriptNotExecutable(PathBuf),
}

impl std::fmt::Display for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dependency::JsonTool(tool) => write!(f, "{tool} not found"),
            Dependency::ScriptNotFound(path) => write!(f, "{} not found", path.display()),
            Dependency::ScriptNotExecutable(path) => {
                write!(f, "{} is not executable", path.display())
            }
        }
    }
}

/// How a backend process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInfo {
    pub code: Option<i32>,
}

impl std::fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit status {code}"),
            None => f.write_str("terminated by signal"),
        }
    }
}

/// Core error types for rulekeeper
#[derive(Debug, Error)]
pub enum Error {
    /// Caller input failed validation; the backend was not invoked
    #[error("Invalid {field}: {reason}")]
    InvalidInput { field: Field, reason: String },

    /// Rule index outside `[0, len)`
    #[error("Rule index {index} out of range (rule count: {len})")]
    IndexOutOfRange { index: i64, len: usize },

    /// Rule document missing, unreadable or malformed
    #[error("Rule store unavailable ({}): {reason}", path.display())]
    StoreUnavailable { path: PathBuf, reason: String },

    /// Precondition for a backend call not met; the backend was not invoked
    #[error("Dependency error: {which}")]
    DependencyMissing { which: Dependency },

    /// Backend ran and reported failure
    #[error("Backend failed ({exit}): {output}")]
    BackendError { exit: ExitInfo, output: String },

    /// Backend process could not be started
    #[error("Backend {} could not be started: {source}", program.display())]
    BackendUnavailable {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Backend did not finish within the configured timeout and was killed
    #[error("Backend {} timed out after {limit:?}", program.display())]
    BackendTimeout { program: PathBuf, limit: Duration },

    /// The rule at `index` is no longer the one the caller selected
    #[error("Rule at index {index} changed since it was listed; refresh and retry")]
    SelectionChanged { index: usize },

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn invalid(field: Field, reason: impl Into<String>) -> Self {
        Error::InvalidInput {
            field,
            reason: reason.into(),
        }
    }

    /// Translates the error into a user-facing message with remediation hints.
    pub fn translate(&self) -> ErrorTranslation {
        match self {
            Error::DependencyMissing {
                which: Dependency::JsonTool(tool),
            } => ErrorTranslation::new(format!("'{tool}' command not found"))
                .with_suggestion(format!(
                    "Install {tool}: sudo apt install {tool}  (Debian/Ubuntu)"
                ))
                .with_suggestion(format!("Or: sudo dnf install {tool}  (Fedora/RHEL)"))
                .with_suggestion("Or set `json_tool` in config.json to its full path"),
            Error::DependencyMissing {
                which: Dependency::ScriptNotFound(path),
            } => ErrorTranslation::new(format!("Backend script {} not found", path.display()))
                .with_suggestion("Check `base_dir` and the script paths in config.json")
                .with_suggestion("Run `rulekeeper config` to see the resolved paths"),
            Error::DependencyMissing {
                which: Dependency::ScriptNotExecutable(path),
            } => ErrorTranslation::new(format!(
                "Backend script {} is not executable",
                path.display()
            ))
            .with_suggestion(format!("Run 'chmod +x {}' to fix", path.display())),
            Error::StoreUnavailable { path, .. } => ErrorTranslation::new(format!(
                "Failed to load rules. Check {}",
                path.display()
            ))
            .with_suggestion("No rules are visible; this does not mean zero rules are configured")
            .with_suggestion("Validate the document with: jq . rules.json"),
            Error::IndexOutOfRange { .. } | Error::SelectionChanged { .. } => {
                ErrorTranslation::new(self.to_string())
                    .with_suggestion("Run `rulekeeper list` and pick an index from the fresh listing")
            }
            Error::BackendError { output, .. } => BackendErrorPattern::match_error(output),
            Error::BackendTimeout { .. } => ErrorTranslation::new(self.to_string())
                .with_suggestion("Raise or remove the timeout with --timeout / backend_timeout_secs"),
            _ => ErrorTranslation::new(self.to_string()),
        }
    }
}

/// Represents a translated error with helpful context
#[derive(Debug, Clone)]
pub struct ErrorTranslation {
    pub user_message: String,
    pub suggestions: Vec<String>,
}

impl ErrorTranslation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            user_message: message.into(),
            suggestions: Vec::new(),
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }
}

/// Known failure patterns in backend script output
pub struct BackendErrorPattern;

impl BackendErrorPattern {
    /// Matches backend output against known patterns and returns a user-friendly translation.
    pub fn match_error(msg: &str) -> ErrorTranslation {
        let lower = msg.to_lowercase();

        if lower.contains("permission denied") || lower.contains("operation not permitted") {
            return ErrorTranslation::new("Insufficient permissions to modify firewall rules")
                .with_suggestion("Run rulekeeper as a user allowed to invoke the backend")
                .with_suggestion("Check if CAP_NET_ADMIN capability is available");
        }

        if lower.contains("jq: error") || lower.contains("parse error") {
            return ErrorTranslation::new("Backend could not parse the rule document")
                .with_suggestion("Validate the document with: jq . rules.json");
        }

        if lower.contains("command not found") || lower.contains("no such file") {
            return ErrorTranslation::new("A tool required by the backend script is missing")
                .with_suggestion("Install the packet-filter front-end the scripts call (iptables/nft)");
        }

        if lower.contains("index") && (lower.contains("invalid") || lower.contains("range")) {
            return ErrorTranslation::new("Backend rejected the rule index")
                .with_suggestion("The rule list changed; run `rulekeeper list` again");
        }

        // Whole words only: "block" is an action name
        let mentions_lock = lower
            .split(|c: char| !c.is_ascii_alphanumeric())
            .any(|word| matches!(word, "lock" | "locked" | "lockfile"));
        if lower.contains("resource busy") || mentions_lock {
            return ErrorTranslation::new("Firewall resource is busy")
                .with_suggestion("Another process may be modifying the rules")
                .with_suggestion("Wait a moment and try again");
        }

        ErrorTranslation::new(format!("Firewall error: {msg}"))
            .with_suggestion("Check the audit log with `rulekeeper audit` for details")
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_input_message_names_field() {
        let err = Error::invalid(Field::Ip, "expected four octets");
        assert_eq!(err.to_string(), "Invalid ip: expected four octets");
    }

    #[test]
    fn test_exit_info_display() {
        assert_eq!(ExitInfo { code: Some(3) }.to_string(), "exit status 3");
        assert_eq!(ExitInfo { code: None }.to_string(), "terminated by signal");
    }

    #[test]
    fn test_not_executable_suggests_chmod() {
        let err = Error::DependencyMissing {
            which: Dependency::ScriptNotExecutable(PathBuf::from("/opt/fw/rule_manager.sh")),
        };
        let translation = err.translate();
        assert!(translation.user_message.contains("not executable"));
        assert!(
            translation
                .suggestions
                .iter()
                .any(|s| s.contains("chmod +x /opt/fw/rule_manager.sh"))
        );
    }

    #[test]
    fn test_missing_jq_lists_install_options() {
        let err = Error::DependencyMissing {
            which: Dependency::JsonTool("jq".to_string()),
        };
        let translation = err.translate();
        assert!(translation.user_message.contains("'jq'"));
        assert!(translation.suggestions.len() >= 2);
    }

    #[test]
    fn test_backend_permission_error() {
        let translation = BackendErrorPattern::match_error("iptables: Permission denied (you must be root)");
        assert!(translation.user_message.contains("permissions"));
    }

    #[test]
    fn test_block_action_is_not_a_lock_error() {
        let translation =
            BackendErrorPattern::match_error("Failed to add block rule: duplicate entry");
        assert!(translation.user_message.starts_with("Firewall error:"));
        assert!(translation.user_message.contains("duplicate entry"));
    }

    #[test]
    fn test_lock_error_is_busy() {
        for msg in ["Device or resource busy", "could not acquire lock on rules.json"] {
            let translation = BackendErrorPattern::match_error(msg);
            assert_eq!(translation.user_message, "Firewall resource is busy", "{msg}");
        }
    }

    #[test]
    fn test_backend_generic_fallback_keeps_output() {
        let translation = BackendErrorPattern::match_error("something odd happened");
        assert!(translation.user_message.contains("something odd happened"));
    }
}
