//! Utility functions for directory management and executable lookup
//!
//! Directories follow the XDG Base Directory specification:
//!
//! - Config: `~/.config/rulekeeper/` - `config.json`
//! - Data: `~/.local/share/rulekeeper/` - default base directory (backend scripts,
//!   `rules.json`, audit log)

use directories::ProjectDirs;
use nix::unistd::{AccessFlags, access};
use std::path::{Path, PathBuf};

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "rulekeeper", "rulekeeper")
}

pub fn get_config_dir() -> Option<PathBuf> {
    project_dirs().map(|pd| pd.config_dir().to_path_buf())
}

pub fn get_data_dir() -> Option<PathBuf> {
    project_dirs().map(|pd| pd.data_dir().to_path_buf())
}

/// Base directory used when the config does not name one.
///
/// Packagers can bake in a system location with `RULEKEEPER_DEFAULT_BASE_DIR`
/// at build time; otherwise the XDG data directory, falling back to `.`.
pub fn default_base_dir() -> PathBuf {
    if let Some(dir) = option_env!("RULEKEEPER_DEFAULT_BASE_DIR") {
        return PathBuf::from(dir);
    }
    get_data_dir().unwrap_or_else(|| PathBuf::from("."))
}

pub fn ensure_dirs() -> std::io::Result<()> {
    use std::fs::DirBuilder;
    use std::os::unix::fs::DirBuilderExt;

    let mut builder = DirBuilder::new();
    builder.mode(0o700); // User read/write/execute only
    builder.recursive(true);

    if let Some(dir) = get_config_dir() {
        builder.create(dir)?;
    }
    if let Some(dir) = get_data_dir() {
        builder.create(dir)?;
    }

    Ok(())
}

/// Returns `true` if `path` is a regular file the current user may execute
pub fn is_executable(path: &Path) -> bool {
    path.is_file() && access(path, AccessFlags::X_OK).is_ok()
}

/// Resolves a tool name the way a shell would.
///
/// Names containing a `/` are taken as paths; bare names are searched for
/// on `PATH`. Only executable regular files match.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }

    if name.contains('/') {
        let path = PathBuf::from(name);
        return is_executable(&path).then_some(path);
    }

    std::env::var_os("PATH").and_then(|paths| {
        std::env::split_paths(&paths).find_map(|dir| {
            let full_path = dir.join(name);
            is_executable(&full_path).then_some(full_path)
        })
    })
}
