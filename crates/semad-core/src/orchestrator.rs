//! Story orchestration: status updates, single-story runs and the epic loop.

use crate::config::Config;
use crate::contract::StoryContract;
use crate::devqa::IterationRecord;
use crate::error::{Result, SemadError};
use crate::executor::{WorkflowExecutor, WorkflowRun};
use crate::io::{self, OsFs, StoryFs};
use crate::paths;
use crate::step::StepContext;
use crate::story::{self, EpicStatus, Story};
use crate::types::{FlowType, StoryStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Atomic status update
// ---------------------------------------------------------------------------

/// Rewrite the `## Status` line of the story at `path`.
pub fn update_story_status(path: &Path, status: StoryStatus) -> Result<()> {
    update_story_status_with(&OsFs, path, status)
}

/// Status update through an explicit [`StoryFs`].
///
/// The new document is written to a temp sibling and renamed over the
/// original. On any failure the temp file is removed and the original bytes
/// are put back if they changed, so the story is either fully updated or
/// byte-identical to before.
pub fn update_story_status_with(fs: &dyn StoryFs, path: &Path, status: StoryStatus) -> Result<()> {
    let fail = |reason: String| SemadError::AtomicUpdate {
        path: path.to_path_buf(),
        reason,
    };

    let original = fs.read(path).map_err(|e| fail(format!("read failed: {e}")))?;
    let text = std::str::from_utf8(&original).map_err(|e| fail(format!("not UTF-8: {e}")))?;
    let updated =
        replace_status(text, status).ok_or_else(|| fail("no '## Status' section".to_string()))?;

    let tmp = paths::temp_sibling(path, &Uuid::new_v4().simple().to_string());
    if let Err(e) = fs.write(&tmp, updated.as_bytes()) {
        let _ = fs.remove(&tmp);
        return Err(fail(format!("write failed: {e}")));
    }
    if let Err(e) = fs.rename(&tmp, path) {
        let _ = fs.remove(&tmp);
        restore(fs, path, &original);
        return Err(fail(format!("rename failed: {e}")));
    }
    tracing::debug!(story = %path.display(), status = %status, "status updated");
    Ok(())
}

fn restore(fs: &dyn StoryFs, path: &Path, original: &[u8]) {
    match fs.read(path) {
        Ok(current) if current == original => {}
        _ => {
            if let Err(e) = fs.write(path, original) {
                tracing::error!(story = %path.display(), "could not restore story: {e}");
            }
        }
    }
}

/// Replace the first non-blank line under `## Status` with `status`.
///
/// When the heading is directly followed by another heading (or the end of
/// the document) the status line is inserted. Returns `None` when there is
/// no status heading outside the front matter.
pub fn replace_status(content: &str, status: StoryStatus) -> Option<String> {
    let body_start = crate::contract::split_front_matter(content)
        .map(|(_, body)| content.len() - body.len())
        .unwrap_or(0);

    let mut out = String::with_capacity(content.len() + 16);
    out.push_str(&content[..body_start]);

    let mut in_section = false;
    let mut done = false;
    for line in content[body_start..].split_inclusive('\n') {
        if done {
            out.push_str(line);
            continue;
        }
        if in_section && !line.trim().is_empty() {
            if line.trim_start().starts_with('#') {
                out.push_str(status.as_str());
                out.push_str("\n\n");
                out.push_str(line);
            } else {
                out.push_str(status.as_str());
                out.push_str(line_ending(line));
            }
            done = true;
            continue;
        }
        if !in_section && story::is_status_heading(line) {
            in_section = true;
        }
        out.push_str(line);
    }

    if !in_section {
        return None;
    }
    if !done {
        if !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(status.as_str());
        out.push('\n');
    }
    Some(out)
}

fn line_ending(line: &str) -> &str {
    if line.ends_with("\r\n") {
        "\r\n"
    } else if line.ends_with('\n') {
        "\n"
    } else {
        ""
    }
}

// ---------------------------------------------------------------------------
// Run records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Approved,
    Overridden,
    Exhausted,
    Failed,
}

impl RunOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            RunOutcome::Approved => "approved",
            RunOutcome::Overridden => "overridden",
            RunOutcome::Exhausted => "exhausted",
            RunOutcome::Failed => "failed",
        }
    }
}

/// One story run, persisted under `.semad/runs/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub workflow: String,
    pub flow_type: FlowType,
    pub story_id: String,
    pub epic_id: String,
    pub story_path: PathBuf,
    pub outcome: RunOutcome,
    pub final_status: StoryStatus,
    pub total_iterations: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub iterations: Vec<IterationRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunRecord {
    pub fn save(&self, root: &Path) -> Result<PathBuf> {
        let path = paths::runs_dir(root).join(format!(
            "{}-{}-{}.yaml",
            self.story_id,
            self.started_at.format("%Y%m%dT%H%M%S"),
            &self.id[..8.min(self.id.len())]
        ));
        let data = serde_yaml::to_string(self)?;
        io::atomic_write(&path, data.as_bytes())?;
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&data)?)
    }
}

/// All run records under `root`, oldest first.
pub fn list_runs(root: &Path) -> Result<Vec<RunRecord>> {
    let dir = paths::runs_dir(root);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut runs = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|e| e == "yaml") {
            match RunRecord::load(&path) {
                Ok(r) => runs.push(r),
                Err(e) => tracing::warn!(path = %path.display(), "skipping unreadable run record: {e}"),
            }
        }
    }
    runs.sort_by_key(|r| r.started_at);
    Ok(runs)
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryRunReport {
    pub story_id: String,
    pub path: PathBuf,
    pub outcome: RunOutcome,
    pub final_status: StoryStatus,
    pub run: WorkflowRun,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<PathBuf>,
}

impl StoryRunReport {
    pub fn accepted(&self) -> bool {
        self.run.accepted()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryFailure {
    pub story_id: String,
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpicLoopReport {
    pub epic_id: String,
    pub processed_stories: usize,
    pub epic_completed: bool,
    pub status: EpicStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<StoryFailure>,
}

pub struct Orchestrator {
    root: PathBuf,
    config: Config,
    executor: WorkflowExecutor,
    fs: Arc<dyn StoryFs>,
}

impl Orchestrator {
    pub fn new(root: &Path, config: Config, executor: WorkflowExecutor) -> Self {
        Self {
            root: root.to_path_buf(),
            config,
            executor,
            fs: Arc::new(OsFs),
        }
    }

    pub fn with_fs(mut self, fs: Arc<dyn StoryFs>) -> Self {
        self.fs = fs;
        self
    }

    pub fn stories_dir(&self) -> PathBuf {
        self.config.stories_path(&self.root)
    }

    /// Run the configured workflow against one story.
    ///
    /// The story moves to InProgress before the workflow starts, to Done when
    /// the run is accepted, and stays InProgress when QA never approved. If
    /// the workflow errors the prior status is restored and the error
    /// returned. A run record is written in every case.
    pub async fn run_story(&self, path: &Path, flow_type: FlowType) -> Result<StoryRunReport> {
        let workflow = self.config.workflow.default_workflow.clone();
        self.run_story_with(path, &workflow, flow_type).await
    }

    /// [`Orchestrator::run_story`] with an explicit workflow name.
    pub async fn run_story_with(
        &self,
        path: &Path,
        workflow: &str,
        flow_type: FlowType,
    ) -> Result<StoryRunReport> {
        let story = Story::load(path)?;
        if self.config.workflow.require_contract {
            require_valid_contract(&story)?;
        }

        let started_at = Utc::now();
        let prior = story.status;
        let workflow = workflow.to_string();
        tracing::info!(story = %story.story_id, workflow = %workflow, flow = %flow_type, "starting story");
        update_story_status_with(self.fs.as_ref(), path, StoryStatus::InProgress)?;

        let context = StepContext::for_story(&workflow, &story);
        let run = match self.executor.execute_with(&workflow, flow_type, &context).await {
            Ok(run) => run,
            Err(e) => {
                let status = match update_story_status_with(self.fs.as_ref(), path, prior) {
                    Ok(()) => prior,
                    Err(restore_err) => {
                        tracing::error!(story = %story.story_id, "could not restore status: {restore_err}");
                        StoryStatus::InProgress
                    }
                };
                let record = RunRecord {
                    id: Uuid::new_v4().to_string(),
                    workflow,
                    flow_type,
                    story_id: story.story_id.clone(),
                    epic_id: story.epic_id.clone(),
                    story_path: path.to_path_buf(),
                    outcome: RunOutcome::Failed,
                    final_status: status,
                    total_iterations: 0,
                    iterations: Vec::new(),
                    error: Some(e.to_string()),
                    started_at,
                    finished_at: Utc::now(),
                };
                self.save_record(&record);
                return Err(e);
            }
        };

        let (outcome, final_status) = if run.qa_approved {
            (RunOutcome::Approved, StoryStatus::Done)
        } else if run.accepted() {
            (RunOutcome::Overridden, StoryStatus::Done)
        } else {
            (RunOutcome::Exhausted, StoryStatus::InProgress)
        };
        if final_status == StoryStatus::Done {
            if let Err(e) = update_story_status_with(self.fs.as_ref(), path, StoryStatus::Done) {
                tracing::error!(story = %story.story_id, "could not mark story done: {e}");
                let record = RunRecord {
                    id: Uuid::new_v4().to_string(),
                    workflow: run.workflow.clone(),
                    flow_type,
                    story_id: story.story_id.clone(),
                    epic_id: story.epic_id.clone(),
                    story_path: path.to_path_buf(),
                    outcome: RunOutcome::Failed,
                    final_status: StoryStatus::InProgress,
                    total_iterations: run.total_iterations,
                    iterations: run.iterations.clone(),
                    error: Some(e.to_string()),
                    started_at,
                    finished_at: Utc::now(),
                };
                self.save_record(&record);
                return Err(e);
            }
            tracing::info!(story = %story.story_id, iterations = run.total_iterations, "story done");
        } else {
            tracing::warn!(
                story = %story.story_id,
                iterations = run.total_iterations,
                "QA did not approve; story left InProgress"
            );
        }

        let record = RunRecord {
            id: Uuid::new_v4().to_string(),
            workflow: run.workflow.clone(),
            flow_type,
            story_id: story.story_id.clone(),
            epic_id: story.epic_id.clone(),
            story_path: path.to_path_buf(),
            outcome,
            final_status,
            total_iterations: run.total_iterations,
            iterations: run.iterations.clone(),
            error: None,
            started_at,
            finished_at: Utc::now(),
        };
        let record = self.save_record(&record);

        Ok(StoryRunReport {
            story_id: story.story_id,
            path: path.to_path_buf(),
            outcome,
            final_status,
            run,
            record,
        })
    }

    /// Process every Approved story of `epic_id` in story order.
    ///
    /// A story that fails is recorded and skipped; the loop never returns a
    /// per-story error. Each story is attempted at most once per call.
    pub async fn execute_epic_loop(&self, epic_id: &str, flow_type: FlowType) -> Result<EpicLoopReport> {
        let dir = self.stories_dir();
        let mut attempted: Vec<PathBuf> = Vec::new();
        let mut processed_stories = 0;
        let mut failures = Vec::new();

        loop {
            let next = match story::next_approved_in_epic_excluding(&dir, epic_id, &attempted) {
                Ok(next) => next,
                Err(SemadError::NoApprovedStoryInEpic(_)) | Err(SemadError::EpicHasNoStories(_)) => {
                    break
                }
                Err(e) => return Err(e),
            };
            attempted.push(next.path.clone());
            let story_id = next.story_id.clone().unwrap_or_else(|| next.filename.clone());

            match self.run_story(&next.path, flow_type).await {
                Ok(report) if report.accepted() => processed_stories += 1,
                Ok(report) => failures.push(StoryFailure {
                    story_id,
                    path: next.path,
                    reason: format!(
                        "QA did not approve after {} iteration(s)",
                        report.run.total_iterations
                    ),
                }),
                Err(e) => {
                    tracing::error!(story = %story_id, "story failed: {e}");
                    failures.push(StoryFailure {
                        story_id,
                        path: next.path,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let status = story::compute_epic_status(&dir, epic_id)?;
        tracing::info!(
            epic = %epic_id,
            processed = processed_stories,
            complete = status.is_complete,
            "epic loop finished"
        );
        Ok(EpicLoopReport {
            epic_id: epic_id.to_string(),
            processed_stories,
            epic_completed: status.is_complete,
            status,
            failures,
        })
    }

    fn save_record(&self, record: &RunRecord) -> Option<PathBuf> {
        match record.save(&self.root) {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!(story = %record.story_id, "could not save run record: {e}");
                None
            }
        }
    }
}

/// Fail unless the story carries a schema-valid StoryContract.
pub fn require_valid_contract(story: &Story) -> Result<StoryContract> {
    let value = story
        .contract
        .as_ref()
        .ok_or_else(|| SemadError::MissingContract(story.story_id.clone()))?;
    StoryContract::from_value(&story.story_id, value)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkflowSettings;
    use crate::devqa::tests::Scripted;
    use crate::error::SemadError;
    use crate::logger::NoopLogger;
    use crate::step::{StepExecutor, StepOutcome};
    use crate::workflow::{StepKind, WorkflowStep};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    const CONTRACT: &str = "---\nStoryContract:\n  version: \"1.0\"\n  story_id: \"{id}\"\n  epic_id: \"1\"\n  apiEndpoints: []\n  filesToModify:\n    - path: src/lib.rs\n      reason: change\n---\n";

    fn write_story(dir: &Path, filename: &str, status: &str) -> PathBuf {
        let id: String = filename.split('.').take(2).collect::<Vec<_>>().join(".");
        let front = CONTRACT.replace("{id}", &id);
        let path = dir.join(filename);
        std::fs::write(
            &path,
            format!("{front}# Story {id}\n\n## Status\n{status}\n\n## Tasks\n- [ ] do it\n"),
        )
        .unwrap();
        path
    }

    fn setup(max_iterations: u32, steps: Arc<dyn StepExecutor>) -> (TempDir, Orchestrator) {
        let dir = TempDir::new().unwrap();
        let mut config = Config::new("test");
        config.workflow = WorkflowSettings {
            max_iterations,
            max_step_retries: 1,
            ..WorkflowSettings::default()
        };
        std::fs::create_dir_all(config.stories_path(dir.path())).unwrap();
        let executor = WorkflowExecutor::new(dir.path(), config.workflow.clone(), steps)
            .with_logger(Arc::new(NoopLogger));
        let orch = Orchestrator::new(dir.path(), config, executor);
        (dir, orch)
    }

    /// QA approves on the second review of each story; one story id can be
    /// made to fail every dev attempt.
    struct PerStory {
        fail_story: Option<String>,
        reviews: Mutex<HashMap<String, u32>>,
    }

    #[async_trait]
    impl StepExecutor for PerStory {
        async fn execute(&self, step: &WorkflowStep, ctx: &crate::step::StepContext) -> Result<StepOutcome> {
            let id = ctx.story_id.clone().unwrap_or_default();
            match step.kind {
                StepKind::DevImplement | StepKind::DevAddressFeedback
                    if self.fail_story.as_deref() == Some(id.as_str()) =>
                {
                    Err(SemadError::StepExecution("dev agent crashed".to_string()))
                }
                StepKind::QaReview => {
                    let mut reviews = self.reviews.lock().unwrap();
                    let n = reviews.entry(id).or_insert(0);
                    *n += 1;
                    let approved = *n >= 2;
                    let issues = if approved {
                        json!([])
                    } else {
                        json!([{"message": "needs work"}])
                    };
                    Ok(StepOutcome::ok(json!({ "approved": approved, "issues": issues })))
                }
                _ => Ok(StepOutcome::ok(json!({}))),
            }
        }
    }

    fn status_of(path: &Path) -> StoryStatus {
        Story::load(path).unwrap().status
    }

    // -- replace_status ---------------------------------------------------

    #[test]
    fn replace_status_rewrites_line() {
        let doc = "# T\n\n## Status\nApproved\n\n## Story\nbody\n";
        let out = replace_status(doc, StoryStatus::Done).unwrap();
        assert_eq!(out, "# T\n\n## Status\nDone\n\n## Story\nbody\n");
    }

    #[test]
    fn replace_status_skips_blank_lines_and_keeps_crlf() {
        let doc = "# T\r\n## Status\r\n\r\nDraft\r\nrest\r\n";
        let out = replace_status(doc, StoryStatus::Approved).unwrap();
        assert_eq!(out, "# T\r\n## Status\r\n\r\nApproved\r\nrest\r\n");
    }

    #[test]
    fn replace_status_inserts_when_missing_line() {
        let out = replace_status("## Status\n## Story\n", StoryStatus::Draft).unwrap();
        assert_eq!(out, "## Status\nDraft\n\n## Story\n");
        let out = replace_status("# T\n## Status", StoryStatus::Done).unwrap();
        assert_eq!(out, "# T\n## Status\nDone\n");
    }

    #[test]
    fn replace_status_ignores_front_matter() {
        let doc = "---\nnote: x\n---\n# T\n## Status\nDraft\n";
        let out = replace_status(doc, StoryStatus::Review).unwrap();
        assert!(out.starts_with("---\nnote: x\n---\n"));
        assert!(out.ends_with("## Status\nReview\n"));
        assert!(replace_status("# no status\n", StoryStatus::Done).is_none());
    }

    // -- atomic update ----------------------------------------------------

    struct FailingRename;

    impl StoryFs for FailingRename {
        fn read(&self, path: &Path) -> std::io::Result<Vec<u8>> {
            OsFs.read(path)
        }
        fn write(&self, path: &Path, data: &[u8]) -> std::io::Result<()> {
            OsFs.write(path, data)
        }
        fn rename(&self, _from: &Path, _to: &Path) -> std::io::Result<()> {
            Err(std::io::Error::other("disk on fire"))
        }
        fn remove(&self, path: &Path) -> std::io::Result<()> {
            OsFs.remove(path)
        }
    }

    #[test]
    fn update_status_on_disk() {
        let dir = TempDir::new().unwrap();
        let path = write_story(dir.path(), "1.1.one.md", "Approved");
        update_story_status(&path, StoryStatus::InProgress).unwrap();
        assert_eq!(status_of(&path), StoryStatus::InProgress);
        let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn failed_rename_leaves_story_untouched() {
        let dir = TempDir::new().unwrap();
        let path = write_story(dir.path(), "1.1.one.md", "Approved");
        let before = std::fs::read(&path).unwrap();

        let err = update_story_status_with(&FailingRename, &path, StoryStatus::Done).unwrap_err();
        assert!(err.to_string().contains("Atomic status update failed"), "{err}");
        assert_eq!(std::fs::read(&path).unwrap(), before);
        let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1, "temp file was not cleaned up");
    }

    #[test]
    fn update_without_status_section() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("1.1.x.md");
        std::fs::write(&path, "# No status\n").unwrap();
        let before = std::fs::read(&path).unwrap();
        let err = update_story_status(&path, StoryStatus::Done).unwrap_err();
        assert!(matches!(err, SemadError::AtomicUpdate { .. }));
        assert!(err.to_string().contains("Atomic status update failed"), "{err}");
        assert!(err.to_string().contains("## Status"), "{err}");
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    /// Lets the first `ok_renames` renames through, then fails every one.
    struct RenameBudget {
        ok_renames: AtomicU32,
    }

    impl StoryFs for RenameBudget {
        fn read(&self, path: &Path) -> std::io::Result<Vec<u8>> {
            OsFs.read(path)
        }
        fn write(&self, path: &Path, data: &[u8]) -> std::io::Result<()> {
            OsFs.write(path, data)
        }
        fn rename(&self, from: &Path, to: &Path) -> std::io::Result<()> {
            let left = self.ok_renames.load(Ordering::SeqCst);
            if left == 0 {
                return Err(std::io::Error::other("read-only filesystem"));
            }
            self.ok_renames.store(left - 1, Ordering::SeqCst);
            OsFs.rename(from, to)
        }
        fn remove(&self, path: &Path) -> std::io::Result<()> {
            OsFs.remove(path)
        }
    }

    // -- run_story --------------------------------------------------------

    #[tokio::test]
    async fn approved_story_ends_done_with_record() {
        let (dir, orch) = setup(3, Arc::new(Scripted::approving_on(1)));
        let path = write_story(&orch.stories_dir(), "1.1.one.md", "Approved");
        let report = orch.run_story(&path, FlowType::Iterative).await.unwrap();
        assert_eq!(report.outcome, RunOutcome::Approved);
        assert_eq!(status_of(&path), StoryStatus::Done);

        let runs = list_runs(dir.path()).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].story_id, "1.1");
        assert_eq!(runs[0].final_status, StoryStatus::Done);
    }

    #[tokio::test]
    async fn exhausted_story_stays_in_progress() {
        let (_dir, orch) = setup(2, Arc::new(Scripted::approving_on(u32::MAX)));
        let path = write_story(&orch.stories_dir(), "1.1.one.md", "Approved");
        let report = orch.run_story(&path, FlowType::Iterative).await.unwrap();
        assert_eq!(report.outcome, RunOutcome::Exhausted);
        assert!(!report.accepted());
        assert_eq!(status_of(&path), StoryStatus::InProgress);
    }

    #[tokio::test]
    async fn failing_story_restores_prior_status() {
        let exec = Scripted {
            dev_failures: u32::MAX,
            ..Scripted::approving_on(1)
        };
        let (dir, orch) = setup(3, Arc::new(exec));
        let path = write_story(&orch.stories_dir(), "1.1.one.md", "Approved");
        let err = orch.run_story(&path, FlowType::Iterative).await.unwrap_err();
        assert!(matches!(err, SemadError::StepFailed { .. }));
        assert_eq!(status_of(&path), StoryStatus::Approved);
        assert_eq!(list_runs(dir.path()).unwrap()[0].outcome, RunOutcome::Failed);
    }

    #[tokio::test]
    async fn failed_done_write_is_recorded() {
        let (dir, orch) = setup(3, Arc::new(Scripted::approving_on(1)));
        let orch = orch.with_fs(Arc::new(RenameBudget {
            ok_renames: AtomicU32::new(1),
        }));
        let path = write_story(&orch.stories_dir(), "1.1.one.md", "Approved");

        let err = orch.run_story(&path, FlowType::Iterative).await.unwrap_err();
        assert!(matches!(err, SemadError::AtomicUpdate { .. }), "{err}");
        assert_eq!(status_of(&path), StoryStatus::InProgress);

        let runs = list_runs(dir.path()).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].outcome, RunOutcome::Failed);
        assert_eq!(runs[0].final_status, StoryStatus::InProgress);
        assert_eq!(runs[0].total_iterations, 1);
        assert!(runs[0]
            .error
            .as_deref()
            .is_some_and(|e| e.contains("Atomic status update failed")));
    }

    #[tokio::test]
    async fn story_without_contract_is_refused() {
        let (_dir, orch) = setup(3, Arc::new(Scripted::approving_on(1)));
        let path = orch.stories_dir().join("1.1.bare.md");
        std::fs::write(&path, "# Bare\n\n## Status\nApproved\n").unwrap();
        let err = orch.run_story(&path, FlowType::Iterative).await.unwrap_err();
        assert!(matches!(err, SemadError::MissingContract(_)));
        assert_eq!(status_of(&path), StoryStatus::Approved);
    }

    #[tokio::test]
    async fn invalid_contract_is_refused() {
        let (_dir, orch) = setup(3, Arc::new(Scripted::approving_on(1)));
        let path = orch.stories_dir().join("1.1.bad.md");
        std::fs::write(
            &path,
            "---\nStoryContract:\n  version: \"1.0\"\n---\n# Bad\n\n## Status\nApproved\n",
        )
        .unwrap();
        let err = orch.run_story(&path, FlowType::Iterative).await.unwrap_err();
        assert!(matches!(err, SemadError::InvalidContract { .. }));
    }

    // -- epic loop --------------------------------------------------------

    #[tokio::test]
    async fn epic_loop_processes_remaining_approved_stories() {
        let exec = PerStory {
            fail_story: None,
            reviews: Mutex::new(HashMap::new()),
        };
        let (_dir, orch) = setup(3, Arc::new(exec));
        let stories = orch.stories_dir();
        let s1 = write_story(&stories, "1.1.one.md", "Done");
        let s2 = write_story(&stories, "1.2.two.md", "Approved");
        let s3 = write_story(&stories, "1.3.three.md", "Approved");

        let report = orch.execute_epic_loop("1", FlowType::Iterative).await.unwrap();
        assert_eq!(report.processed_stories, 2);
        assert!(report.epic_completed);
        assert!(report.failures.is_empty());
        for path in [&s1, &s2, &s3] {
            assert_eq!(status_of(path), StoryStatus::Done);
        }
    }

    #[tokio::test]
    async fn epic_loop_continues_past_failing_story() {
        let exec = PerStory {
            fail_story: Some("1.1".to_string()),
            reviews: Mutex::new(HashMap::new()),
        };
        let (_dir, orch) = setup(3, Arc::new(exec));
        let stories = orch.stories_dir();
        let a = write_story(&stories, "1.1.a.md", "Approved");
        let b = write_story(&stories, "1.2.b.md", "Approved");

        let report = orch.execute_epic_loop("1", FlowType::Iterative).await.unwrap();
        assert_eq!(report.processed_stories, 1);
        assert!(!report.epic_completed);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].story_id, "1.1");
        assert_eq!(status_of(&a), StoryStatus::Approved);
        assert_eq!(status_of(&b), StoryStatus::Done);
    }

    #[tokio::test]
    async fn epic_loop_survives_unreadable_story() {
        let exec = PerStory {
            fail_story: None,
            reviews: Mutex::new(HashMap::new()),
        };
        let (_dir, orch) = setup(3, Arc::new(exec));
        let stories = orch.stories_dir();
        let good = write_story(&stories, "1.1.good.md", "Approved");
        std::fs::write(stories.join("1.2.bad.md"), b"\xff\xfe").unwrap();

        let report = orch.execute_epic_loop("1", FlowType::Iterative).await.unwrap();
        assert_eq!(report.processed_stories, 1);
        assert_eq!(status_of(&good), StoryStatus::Done);
        assert_eq!(report.status.total_stories, 2);
        assert_eq!(report.status.in_progress_stories, 1);
        assert!(!report.epic_completed);
    }

    #[tokio::test]
    async fn epic_loop_with_nothing_to_do() {
        let (_dir, orch) = setup(3, Arc::new(Scripted::approving_on(1)));
        let report = orch.execute_epic_loop("9", FlowType::Iterative).await.unwrap();
        assert_eq!(report.processed_stories, 0);
        assert!(!report.epic_completed);
        assert_eq!(report.status.total_stories, 0);
    }

    #[tokio::test]
    async fn epic_loop_missing_stories_dir_is_error() {
        let (_dir, orch) = setup(3, Arc::new(Scripted::approving_on(1)));
        std::fs::remove_dir_all(orch.stories_dir()).unwrap();
        assert!(matches!(
            orch.execute_epic_loop("1", FlowType::Iterative).await,
            Err(SemadError::StoriesDirMissing(_))
        ));
    }
}
