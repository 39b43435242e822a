use semad_core::paths;
use std::path::{Path, PathBuf};

/// Resolve the project root.
///
/// Priority:
/// 1. `--root` flag / `SEMAD_ROOT` env var (passed in as `explicit`)
/// 2. Nearest ancestor of the cwd containing `.semad/`
/// 3. Nearest ancestor of the cwd containing `.git/`
/// 4. The cwd itself
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_root_from(&cwd)
}

fn find_root_from(start: &Path) -> PathBuf {
    for marker in [paths::SEMAD_DIR, ".git"] {
        if let Some(dir) = start.ancestors().find(|d| d.join(marker).is_dir()) {
            return dir.to_path_buf();
        }
    }
    start.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_root_wins() {
        let dir = TempDir::new().unwrap();
        assert_eq!(resolve_root(Some(dir.path())), dir.path());
    }

    #[test]
    fn finds_semad_dir_above_cwd() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".semad")).unwrap();
        let deep = dir.path().join("src/deep");
        std::fs::create_dir_all(&deep).unwrap();
        assert_eq!(find_root_from(&deep), dir.path());
    }

    #[test]
    fn semad_dir_preferred_over_git() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        let project = dir.path().join("project");
        std::fs::create_dir_all(project.join(".semad")).unwrap();
        std::fs::create_dir_all(project.join("docs")).unwrap();
        assert_eq!(find_root_from(&project.join("docs")), project);
    }

    #[test]
    fn falls_back_to_git() {
        let dir = TempDir::new().unwrap();
        let plain = dir.path().join("plain");
        std::fs::create_dir_all(&plain).unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        assert_eq!(find_root_from(&plain), dir.path());
    }
}
