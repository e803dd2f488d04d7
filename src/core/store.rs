//! Rule store: the persisted rule document
//!
//! The document is a JSON array of rule records and is the single source of
//! truth; nothing is cached between calls. Reads validate every record and
//! fail as a whole, so callers never see a partially parsed rule set.
//!
//! Mutations re-read, modify and rewrite the whole document (temp file +
//! rename) while holding an exclusive `flock` on `<document>.lock`. The lock
//! only serializes writers that take it; the backend scripts are expected to
//! serialize their own writes.

use crate::core::error::{Error, Result};
use crate::core::rule::{MAX_RULES, Rule};
use crate::validators::validate_index;
use nix::fcntl::{Flock, FlockArg};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RuleStore {
    path: PathBuf,
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

impl RuleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn unavailable(&self, reason: impl std::fmt::Display) -> Error {
        Error::StoreUnavailable {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }

    /// Reads the ordered rule list fresh from disk.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if the document is missing, unreadable,
    /// not a JSON array of valid rules, or holds more than [`MAX_RULES`].
    pub async fn list(&self) -> Result<Vec<Rule>> {
        let json = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| self.unavailable(e))?;

        let rules: Vec<Rule> = serde_json::from_str(&json).map_err(|e| {
            warn!("Rule document {} is malformed: {}", self.path.display(), e);
            self.unavailable(e)
        })?;

        if rules.len() > MAX_RULES {
            return Err(self.unavailable(format!(
                "document contains {} rules (max: {MAX_RULES})",
                rules.len()
            )));
        }

        debug!("Loaded {} rules from {}", rules.len(), self.path.display());
        Ok(rules)
    }

    /// Appends a rule to the end of the document.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if the current document cannot be read,
    /// or an I/O error if the rewrite fails.
    pub async fn append(&self, rule: Rule) -> Result<()> {
        let _lock = self.lock().await?;

        let mut rules = self.list().await?;
        if rules.len() >= MAX_RULES {
            return Err(self.unavailable(format!("rule limit of {MAX_RULES} reached")));
        }
        rules.push(rule);
        self.write_rules(&rules).await
    }

    /// Removes and returns the rule at `index`.
    ///
    /// # Errors
    ///
    /// Returns `IndexOutOfRange` if `index` is outside `[0, len)`.
    pub async fn remove_at(&self, index: i64) -> Result<Rule> {
        let _lock = self.lock().await?;

        let mut rules = self.list().await?;
        let index = validate_index(index, rules.len())?;
        let removed = rules.remove(index);
        self.write_rules(&rules).await?;
        Ok(removed)
    }

    /// Creates an empty document if none exists; an existing one is left as is.
    ///
    /// Returns `true` if a document was created.
    pub async fn initialize(&self) -> Result<bool> {
        let _lock = self.lock().await?;

        if tokio::fs::try_exists(&self.path).await? {
            return Ok(false);
        }
        self.write_rules(&[]).await?;
        Ok(true)
    }

    /// Takes the exclusive advisory lock guarding read-modify-write cycles.
    async fn lock(&self) -> Result<Flock<std::fs::File>> {
        let lock_path = sibling(&self.path, ".lock");

        let guard = tokio::task::spawn_blocking(move || -> std::io::Result<Flock<std::fs::File>> {
            use std::os::unix::fs::OpenOptionsExt;

            let file = std::fs::OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .mode(0o600)
                .open(&lock_path)?;

            Flock::lock(file, FlockArg::LockExclusive).map_err(|(_, errno)| errno.into())
        })
        .await
        .map_err(std::io::Error::other)??;

        Ok(guard)
    }

    /// Replaces the whole document atomically.
    async fn write_rules(&self, rules: &[Rule]) -> Result<()> {
        use tokio::fs::OpenOptions;
        use tokio::io::AsyncWriteExt;

        let json = serde_json::to_string_pretty(rules)?;
        let temp_path = sibling(&self.path, ".tmp");

        // Set restrictive permissions (0o600) BEFORE writing firewall rules
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .mode(0o600)
            .open(&temp_path)
            .await?;

        file.write_all(json.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.sync_all().await?;

        tokio::fs::rename(&temp_path, &self.path).await?;
        debug!("Wrote {} rules to {}", rules.len(), self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rule::{Action, Protocol};

    fn rule(action: &str, ip: &str, port: &str, protocol: &str) -> Rule {
        Rule::new(action, ip, port, protocol).unwrap()
    }

    async fn store_with(json: &str) -> (tempfile::TempDir, RuleStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        tokio::fs::write(&path, json).await.unwrap();
        (dir, RuleStore::new(path))
    }

    #[tokio::test]
    async fn test_list_preserves_order() {
        let (_dir, store) = store_with(
            r#"[{"action":"block","ip":"10.0.0.5","port":"22","protocol":"tcp"},
                {"action":"allow","ip":"","port":"","protocol":"all"}]"#,
        )
        .await;

        let rules = store.list().await.unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].action, Action::Block);
        assert_eq!(rules[1].protocol, Protocol::All);
        assert_eq!(rules[1].ip(), None);
    }

    #[tokio::test]
    async fn test_missing_document_is_unavailable_not_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = RuleStore::new(dir.path().join("rules.json"));
        assert!(matches!(store.list().await, Err(Error::StoreUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_corrupt_documents_are_unavailable() {
        for json in [
            "",
            "{not json",
            r#"{"action":"allow"}"#,
            r#"[{"action":"allow","ip":"","port":"","protocol":"icmp"}]"#,
            r#"[{"action":"allow","ip":"1.2.3","port":"","protocol":"tcp"}]"#,
            r#"[{"action":"allow","ip":"","port":"eighty","protocol":"tcp"}]"#,
            r#"[{"action":"allow","ip":"","port":""}]"#,
        ] {
            let (_dir, store) = store_with(json).await;
            assert!(
                matches!(store.list().await, Err(Error::StoreUnavailable { .. })),
                "{json:?} should be unavailable"
            );
        }
    }

    #[tokio::test]
    async fn test_append_then_remove() {
        let (_dir, store) = store_with("[]").await;

        store.append(rule("allow", "", "80", "tcp")).await.unwrap();
        store.append(rule("block", "10.0.0.5", "", "udp")).await.unwrap();
        assert_eq!(store.list().await.unwrap().len(), 2);

        let removed = store.remove_at(0).await.unwrap();
        assert_eq!(removed, rule("allow", "", "80", "tcp"));

        let rules = store.list().await.unwrap();
        assert_eq!(rules, vec![rule("block", "10.0.0.5", "", "udp")]);
    }

    #[tokio::test]
    async fn test_append_to_missing_document_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = RuleStore::new(dir.path().join("rules.json"));
        let result = store.append(rule("allow", "", "", "all")).await;
        assert!(matches!(result, Err(Error::StoreUnavailable { .. })));
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_remove_out_of_range_leaves_document_untouched() {
        let (_dir, store) = store_with(r#"[{"action":"allow","ip":"","port":"","protocol":"all"}]"#).await;
        let before = tokio::fs::read_to_string(store.path()).await.unwrap();

        for index in [1, 7, -1] {
            assert!(matches!(
                store.remove_at(index).await,
                Err(Error::IndexOutOfRange { len: 1, .. })
            ));
        }
        assert_eq!(tokio::fs::read_to_string(store.path()).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_written_document_uses_wire_format() {
        let (_dir, store) = store_with("[]").await;
        store.append(rule("Block", "10.0.0.5", "", "TCP")).await.unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&tokio::fs::read_to_string(store.path()).await.unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{"action": "block", "ip": "10.0.0.5", "port": "", "protocol": "tcp"}])
        );
    }

    #[tokio::test]
    async fn test_initialize_only_creates_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = RuleStore::new(dir.path().join("rules.json"));

        assert!(store.initialize().await.unwrap());
        store.append(rule("allow", "", "22", "tcp")).await.unwrap();
        assert!(!store.initialize().await.unwrap());
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_appends_are_not_lost() {
        let (_dir, store) = store_with("[]").await;

        let mut handles = Vec::new();
        for port in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .append(rule("allow", "", &port.to_string(), "tcp"))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.list().await.unwrap().len(), 16);
    }

    #[tokio::test]
    async fn test_oversized_document_is_rejected() {
        let record = r#"{"action":"allow","ip":"","port":"","protocol":"all"}"#;
        let json = format!("[{}]", vec![record; MAX_RULES + 1].join(","));
        let (_dir, store) = store_with(&json).await;
        assert!(matches!(store.list().await, Err(Error::StoreUnavailable { .. })));
    }
}
