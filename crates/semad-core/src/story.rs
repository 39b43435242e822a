use crate::contract;
use crate::error::{Result, SemadError};
use crate::paths::{self, StoryFileName};
use crate::types::StoryStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub const STATUS_HEADING: &str = "## Status";

// ---------------------------------------------------------------------------
// Story (full document)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Story {
    pub path: PathBuf,
    pub filename: String,
    pub epic_id: String,
    pub story_id: String,
    pub title: String,
    pub status: StoryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract: Option<Value>,
}

impl Story {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SemadError::StoryNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(path, &content)
    }

    /// Parse a story document. The filename must follow
    /// `<epic>.<story>.<slug>.md`; a malformed front matter block is an error.
    pub fn parse(path: &Path, content: &str) -> Result<Self> {
        let filename = file_name(path);
        let parsed = paths::parse_story_filename(&filename)
            .ok_or_else(|| SemadError::InvalidStoryFilename(filename.clone()))?;
        let contract = contract::extract_contract(content).map_err(|e| match e {
            SemadError::ContractParse { message, .. } => SemadError::ContractParse {
                origin: path.display().to_string(),
                message,
            },
            other => other,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            title: parse_title(content).unwrap_or_else(|| parsed.slug.clone()),
            status: parse_status(content),
            epic_id: parsed.epic_id,
            story_id: parsed.story_id,
            filename,
            contract,
        })
    }
}

/// First `# ` heading outside the front matter.
pub fn parse_title(content: &str) -> Option<String> {
    body(content)
        .lines()
        .find_map(|l| l.strip_prefix("# "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// First non-blank line under the `## Status` heading.
pub fn parse_status(content: &str) -> StoryStatus {
    let mut lines = body(content).lines();
    while let Some(line) = lines.next() {
        if is_status_heading(line) {
            return lines
                .find(|l| !l.trim().is_empty())
                .map(StoryStatus::parse_lenient)
                .unwrap_or(StoryStatus::Unknown);
        }
    }
    StoryStatus::Unknown
}

pub(crate) fn is_status_heading(line: &str) -> bool {
    line.trim().eq_ignore_ascii_case(STATUS_HEADING)
}

fn body(content: &str) -> &str {
    contract::split_front_matter(content)
        .map(|(_, body)| body)
        .unwrap_or(content)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Summaries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorySummary {
    pub path: PathBuf,
    pub filename: String,
    pub epic_id: String,
    /// `None` when the filename does not follow the story naming convention.
    pub story_id: Option<String>,
    #[serde(skip)]
    story_number: Option<u32>,
    pub title: String,
    pub status: StoryStatus,
}

impl StorySummary {
    fn unparseable(path: PathBuf, filename: String, epic_id: &str) -> Self {
        Self {
            path,
            title: filename.clone(),
            filename,
            epic_id: epic_id.to_string(),
            story_id: None,
            story_number: None,
            status: StoryStatus::Unknown,
        }
    }

    /// A story that can't be read is still listed, as `Unknown` titled by
    /// its filename.
    fn from_document(path: PathBuf, filename: String, name: StoryFileName) -> Self {
        let (title, status) = match std::fs::read_to_string(&path) {
            Ok(content) => (
                parse_title(&content).unwrap_or_else(|| name.slug.clone()),
                parse_status(&content),
            ),
            Err(e) => {
                tracing::warn!(story = %filename, error = %e, "unreadable story file");
                (filename.clone(), StoryStatus::Unknown)
            }
        };
        Self {
            title,
            status,
            path,
            filename,
            epic_id: name.epic_id,
            story_id: Some(name.story_id),
            story_number: Some(name.story_number),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovedStory {
    pub path: PathBuf,
    pub filename: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story_contract: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpicStatus {
    pub total_stories: usize,
    pub completed_stories: usize,
    pub pending_stories: usize,
    pub in_progress_stories: usize,
    pub is_complete: bool,
}

// ---------------------------------------------------------------------------
// Finder
// ---------------------------------------------------------------------------

fn markdown_files(dir: &Path) -> Result<Vec<(PathBuf, String)>> {
    if !dir.is_dir() {
        return Err(SemadError::StoriesDirMissing(dir.to_path_buf()));
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(&format!(".{}", paths::STORY_EXTENSION)) {
            files.push((entry.path(), name));
        }
    }
    Ok(files)
}

/// List the stories of one epic, sorted by story number.
///
/// Only filenames starting with `<epic>.` are opened. Files with that prefix
/// that don't follow the naming convention are kept as `Unknown` entries
/// after the numbered ones.
pub fn list_stories_for_epic(dir: &Path, epic_id: &str) -> Result<Vec<StorySummary>> {
    let prefix = format!("{epic_id}.");
    let mut stories = Vec::new();
    for (path, filename) in markdown_files(dir)? {
        if !filename.starts_with(&prefix) {
            continue;
        }
        let summary = match paths::parse_story_filename(&filename) {
            Some(name) if name.epic_id == epic_id => {
                StorySummary::from_document(path, filename, name)
            }
            _ => StorySummary::unparseable(path, filename, epic_id),
        };
        stories.push(summary);
    }
    stories.sort_by(|a, b| match (a.story_number, b.story_number) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.filename.cmp(&b.filename),
    });
    Ok(stories)
}

/// First Approved story of the epic in story-number order.
pub fn find_next_approved_story_in_epic(dir: &Path, epic_id: &str) -> Result<StorySummary> {
    next_approved_in_epic_excluding(dir, epic_id, &[])
}

/// Like [`find_next_approved_story_in_epic`] but skipping stories whose
/// paths are in `skip`.
pub fn next_approved_in_epic_excluding(
    dir: &Path,
    epic_id: &str,
    skip: &[PathBuf],
) -> Result<StorySummary> {
    let stories = list_stories_for_epic(dir, epic_id)?;
    if stories.is_empty() {
        return Err(SemadError::EpicHasNoStories(epic_id.to_string()));
    }
    stories
        .into_iter()
        .find(|s| s.status == StoryStatus::Approved && !skip.contains(&s.path))
        .ok_or_else(|| SemadError::NoApprovedStoryInEpic(epic_id.to_string()))
}

/// The most recently modified Approved story in `dir`, across all epics.
pub fn find_next_approved_story(dir: &Path) -> Result<ApprovedStory> {
    let files = markdown_files(dir)?;
    if files.is_empty() {
        return Err(SemadError::NoStoryFiles(dir.to_path_buf()));
    }

    let mut best: Option<(SystemTime, PathBuf, String, String)> = None;
    for (path, filename) in files {
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(story = %filename, error = %e, "skipping unreadable story file");
                continue;
            }
        };
        if parse_status(&content) != StoryStatus::Approved {
            continue;
        }
        let modified = std::fs::metadata(&path)?.modified()?;
        if best.as_ref().map_or(true, |(t, ..)| modified > *t) {
            let title = parse_title(&content).unwrap_or_else(|| filename.clone());
            best = Some((modified, path, filename, title));
        }
    }

    let (_, path, filename, title) =
        best.ok_or_else(|| SemadError::NoApprovedStories(dir.to_path_buf()))?;
    let story_contract = match contract::extract_contract_from_file(&path) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(story = %filename, error = %e, "unreadable StoryContract");
            None
        }
    };
    Ok(ApprovedStory {
        path,
        filename,
        title,
        story_contract,
    })
}

/// Aggregate status counts for one epic. Recomputed from disk on every call.
pub fn compute_epic_status(dir: &Path, epic_id: &str) -> Result<EpicStatus> {
    let stories = list_stories_for_epic(dir, epic_id)?;
    let total_stories = stories.len();
    let completed_stories = stories
        .iter()
        .filter(|s| s.status == StoryStatus::Done)
        .count();
    let pending_stories = stories
        .iter()
        .filter(|s| s.status == StoryStatus::Approved)
        .count();
    Ok(EpicStatus {
        total_stories,
        completed_stories,
        pending_stories,
        in_progress_stories: total_stories - completed_stories - pending_stories,
        is_complete: total_stories > 0 && completed_stories == total_stories,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
