use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const SEMAD_DIR: &str = ".semad";
pub const WORKFLOWS_DIR: &str = ".semad/workflows";
pub const RUNS_DIR: &str = ".semad/runs";
pub const CONFIG_FILE: &str = ".semad/config.yaml";

pub const DEFAULT_STORIES_DIR: &str = "docs/stories";
pub const DEFAULT_PRD: &str = "docs/prd.md";
pub const DEFAULT_ARCHITECTURE: &str = "docs/architecture.md";

pub const STORY_EXTENSION: &str = "md";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn workflows_dir(root: &Path) -> PathBuf {
    root.join(WORKFLOWS_DIR)
}

pub fn workflow_path(root: &Path, name: &str) -> PathBuf {
    workflows_dir(root).join(format!("{name}.yaml"))
}

pub fn runs_dir(root: &Path) -> PathBuf {
    root.join(RUNS_DIR)
}

/// Sibling temp path used for write-then-rename updates of `path`.
pub fn temp_sibling(path: &Path, tag: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.{tag}.tmp"))
}

// ---------------------------------------------------------------------------
// Story filenames
// ---------------------------------------------------------------------------

static STORY_FILE_RE: OnceLock<Regex> = OnceLock::new();

fn story_file_re() -> &'static Regex {
    STORY_FILE_RE.get_or_init(|| Regex::new(r"^(\d+)\.(\d+)\.([^/]+)\.md$").unwrap())
}

/// Components of a `<epic>.<story>.<slug>.md` filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoryFileName {
    pub epic_id: String,
    pub story_id: String,
    pub story_number: u32,
    pub slug: String,
}

pub fn parse_story_filename(filename: &str) -> Option<StoryFileName> {
    let caps = story_file_re().captures(filename)?;
    let story_number = caps[2].parse().ok()?;
    Some(StoryFileName {
        epic_id: caps[1].to_string(),
        story_id: format!("{}.{}", &caps[1], &caps[2]),
        story_number,
        slug: caps[3].to_string(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_story_filenames() {
        let parsed = parse_story_filename("1.10.user-login.md").unwrap();
        assert_eq!(parsed.epic_id, "1");
        assert_eq!(parsed.story_id, "1.10");
        assert_eq!(parsed.story_number, 10);
        assert_eq!(parsed.slug, "user-login");
    }

    #[test]
    fn rejects_malformed_filenames() {
        for name in ["1.md", "1.x.slug.md", "notes.md", "1.2.slug.txt", "a.1.slug.md"] {
            assert!(parse_story_filename(name).is_none(), "expected reject: {name}");
        }
    }

    #[test]
    fn path_helpers() {
        let root = Path::new("/tmp/proj");
        assert_eq!(
            config_path(root),
            PathBuf::from("/tmp/proj/.semad/config.yaml")
        );
        assert_eq!(
            workflow_path(root, "dev-qa-cycle"),
            PathBuf::from("/tmp/proj/.semad/workflows/dev-qa-cycle.yaml")
        );
        assert_eq!(
            temp_sibling(Path::new("/s/1.1.a.md"), "abc"),
            PathBuf::from("/s/.1.1.a.md.abc.tmp")
        );
    }
}
