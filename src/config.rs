use crate::utils::{default_base_dir, get_config_dir};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration: where the backend lives and how to call it
///
/// Relative paths resolve against `base_dir`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
    /// Script handling `add_rule`, `delete_rule` and `export_rules`
    #[serde(default = "default_rule_manager")]
    pub rule_manager_script: PathBuf,
    /// Script answering traffic checks
    #[serde(default = "default_firewall")]
    pub firewall_script: PathBuf,
    /// Script handling `export_logs` and `show_stats`
    #[serde(default = "default_logger")]
    pub logger_script: PathBuf,
    #[serde(default = "default_rules_file")]
    pub rules_file: PathBuf,
    #[serde(default = "default_audit_log")]
    pub audit_log: PathBuf,
    /// JSON tool the backend scripts depend on (name on PATH or a path)
    #[serde(default = "default_json_tool")]
    pub json_tool: String,
    /// Kill backend calls running longer than this; `None` waits forever
    #[serde(default)]
    pub backend_timeout_secs: Option<u64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            rule_manager_script: default_rule_manager(),
            firewall_script: default_firewall(),
            logger_script: default_logger(),
            rules_file: default_rules_file(),
            audit_log: default_audit_log(),
            json_tool: default_json_tool(),
            backend_timeout_secs: None,
        }
    }
}

fn default_rule_manager() -> PathBuf {
    PathBuf::from("rule_manager.sh")
}

fn default_firewall() -> PathBuf {
    PathBuf::from("firewall.sh")
}

fn default_logger() -> PathBuf {
    PathBuf::from("logger.sh")
}

fn default_rules_file() -> PathBuf {
    PathBuf::from("rules.json")
}

fn default_audit_log() -> PathBuf {
    PathBuf::from("firewall_gui.log")
}

fn default_json_tool() -> String {
    "jq".to_string()
}

impl AppConfig {
    /// Config rooted at `base_dir` with every other field at its default
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Self::default()
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn rule_manager_path(&self) -> PathBuf {
        self.resolve(&self.rule_manager_script)
    }

    pub fn firewall_path(&self) -> PathBuf {
        self.resolve(&self.firewall_script)
    }

    pub fn logger_path(&self) -> PathBuf {
        self.resolve(&self.logger_script)
    }

    pub fn rules_path(&self) -> PathBuf {
        self.resolve(&self.rules_file)
    }

    pub fn audit_log_path(&self) -> PathBuf {
        self.resolve(&self.audit_log)
    }

    pub fn backend_timeout(&self) -> Option<Duration> {
        self.backend_timeout_secs.map(Duration::from_secs)
    }
}

/// Default location of `config.json`
pub fn default_config_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join("config.json"))
}

/// Loads the config from `path`, or returns defaults if the file is absent.
///
/// Unlike a missing file, a file that exists but does not parse is an error:
/// silently falling back would point the backend at the wrong scripts.
pub async fn load_config(path: &Path) -> std::io::Result<AppConfig> {
    match tokio::fs::read_to_string(path).await {
        Ok(json) => serde_json::from_str(&json).map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("{}: {e}", path.display()),
            )
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(AppConfig::default())
        }
        Err(e) => Err(e),
    }
}

/// Saves the config using an atomic write pattern.
/// 1. Writes to a temporary file created with mode 0o600.
/// 2. Flushes it to disk.
/// 3. Atomically renames it over the target path.
pub async fn save_config(path: &Path, config: &AppConfig) -> std::io::Result<()> {
    use tokio::fs::OpenOptions;
    use tokio::io::AsyncWriteExt;

    let json = serde_json::to_string_pretty(config)?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut temp_path = path.as_os_str().to_owned();
    temp_path.push(".tmp");
    let temp_path = PathBuf::from(temp_path);

    // Create file with restrictive permissions from the start
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .mode(0o600)
        .open(&temp_path)
        .await?;

    file.write_all(json.as_bytes()).await?;
    file.sync_all().await?;

    tokio::fs::rename(&temp_path, path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::StorageFull {
            std::io::Error::new(
                std::io::ErrorKind::StorageFull,
                "Disk full: cannot save configuration. Free up space and try again.",
            )
        } else {
            e
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_paths_resolve_against_base_dir() {
        let config = AppConfig::with_base_dir("/opt/fw");
        assert_eq!(config.rule_manager_path(), PathBuf::from("/opt/fw/rule_manager.sh"));
        assert_eq!(config.rules_path(), PathBuf::from("/opt/fw/rules.json"));
        assert_eq!(config.audit_log_path(), PathBuf::from("/opt/fw/firewall_gui.log"));
    }

    #[test]
    fn test_absolute_paths_are_kept() {
        let mut config = AppConfig::with_base_dir("/opt/fw");
        config.logger_script = PathBuf::from("/usr/libexec/fw/logger.sh");
        assert_eq!(config.logger_path(), PathBuf::from("/usr/libexec/fw/logger.sh"));
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"base_dir": "/srv/fw", "backend_timeout_secs": 30}"#).unwrap();
        assert_eq!(config.base_dir, PathBuf::from("/srv/fw"));
        assert_eq!(config.json_tool, "jq");
        assert_eq!(config.backend_timeout(), Some(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn test_missing_config_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("config.json")).await.unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.backend_timeout(), None);
    }

    #[tokio::test]
    async fn test_corrupt_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, "{not json").await.unwrap();
        let err = load_config(&path).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = AppConfig::with_base_dir(dir.path());
        config.json_tool = "/usr/bin/jq".to_string();

        save_config(&path, &config).await.unwrap();
        assert_eq!(load_config(&path).await.unwrap(), config);

        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
