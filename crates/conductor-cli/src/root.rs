use std::path::{Path, PathBuf};

/// Resolve the conductor root directory.
///
/// Priority:
/// 1. `--root` flag / `CONDUCTOR_ROOT` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `.conductor/`
/// 3. Walk upward from `cwd` looking for `.git/`
/// 4. Fall back to `cwd`
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    for marker in [".conductor", ".git"] {
        if let Some(found) = find_upward(&cwd, marker) {
            return found;
        }
    }

    cwd
}

/// Walk from `start` toward the filesystem root, returning the first
/// directory containing `marker`.
fn find_upward(start: &Path, marker: &str) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        if dir.join(marker).is_dir() {
            return Some(dir);
        }
        match dir.parent() {
            Some(p) => dir = p.to_path_buf(),
            None => return None,
        }
    }
}

/// Path of the control-plane database under `root`, creating the
/// `.conductor/` directory if needed.
pub fn control_db_path(root: &Path) -> anyhow::Result<PathBuf> {
    let dir = root.join(".conductor");
    std::fs::create_dir_all(&dir)?;
    Ok(dir.join("control.db"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_root_wins() {
        let dir = TempDir::new().unwrap();
        let result = resolve_root(Some(dir.path()));
        assert_eq!(result, dir.path());
    }

    #[test]
    fn find_upward_stops_at_marker() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".conductor")).unwrap();
        let deep = dir.path().join("src/deep");
        std::fs::create_dir_all(&deep).unwrap();

        let found = find_upward(&deep, ".conductor").unwrap();
        assert_eq!(found, dir.path());
        assert!(find_upward(&deep, ".nonexistent-marker").is_none());
    }

    #[test]
    fn control_db_path_creates_dir() {
        let dir = TempDir::new().unwrap();
        let db = control_db_path(dir.path()).unwrap();
        assert!(dir.path().join(".conductor").is_dir());
        assert!(db.ends_with(".conductor/control.db"));
    }
}
