// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use std::path::{Path, PathBuf};

const DATA_DIR_ENV: &str = "DATA_DIR";

fn absolute(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return path;
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path,
    }
}

fn env_data_dir() -> Option<String> {
    std::env::var(DATA_DIR_ENV)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Resolve the active data directory using precedence:
/// 1) explicit `DATA_DIR`
/// 2) cwd-relative `./backend_db`
pub fn resolve_data_dir(explicit_data_dir: Option<&str>) -> PathBuf {
    if let Some(dir) = explicit_data_dir
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .or_else(env_data_dir)
    {
        return absolute(PathBuf::from(dir));
    }
    absolute(PathBuf::from("backend_db"))
}

/// Resolve a path that may be absolute or relative.
/// Relative paths honor DATA_DIR precedence and are returned as absolute paths.
pub fn resolve_data_path(raw_path: &str, explicit_data_dir: Option<&str>) -> PathBuf {
    let as_path = PathBuf::from(raw_path);
    if as_path.is_absolute() {
        return as_path;
    }
    if explicit_data_dir
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .is_some()
        || env_data_dir().is_some()
    {
        return resolve_data_dir(explicit_data_dir).join(as_path);
    }
    absolute(as_path)
}

/// Ensure the parent directory of a data file exists before SQLite opens it.
pub fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_paths_pass_through_untouched() {
        let raw = "/db/orders.db";
        assert_eq!(resolve_data_path(raw, Some("/elsewhere")), PathBuf::from(raw));
    }

    #[test]
    fn explicit_data_dir_prefixes_relative_paths() {
        let resolved = resolve_data_path("orders.db", Some("/var/lib/dabanc"));
        assert_eq!(resolved, PathBuf::from("/var/lib/dabanc/orders.db"));
    }
}
