//! Step execution seam.
//!
//! The workflow engine never talks to an agent directly. Each step is handed
//! to a [`StepExecutor`] together with a [`StepContext`]; the executor returns
//! a [`StepOutcome`]. QA steps report their verdict in `outcome.data` as
//! `{approved, issues}`.

use crate::config::{AgentBackend, AgentsConfig};
use crate::error::{Result, SemadError};
use crate::story::Story;
use crate::workflow::{StepKind, WorkflowStep};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

// ---------------------------------------------------------------------------
// Step I/O
// ---------------------------------------------------------------------------

/// Input handed to every step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepContext {
    pub workflow: String,
    /// 1-based dev/qa iteration; `0` outside the dev/qa block.
    #[serde(default)]
    pub iteration: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epic_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story_path: Option<PathBuf>,
    /// Issues raised by the previous QA review.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub qa_issues: Vec<QaIssue>,
    /// Output of the dev step QA is reviewing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev_result: Option<Value>,
    /// Caller-supplied values passed through untouched.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub vars: Map<String, Value>,
}

impl StepContext {
    pub fn new(workflow: impl Into<String>) -> Self {
        Self {
            workflow: workflow.into(),
            ..Self::default()
        }
    }

    pub fn for_story(workflow: impl Into<String>, story: &Story) -> Self {
        Self {
            story_id: Some(story.story_id.clone()),
            epic_id: Some(story.epic_id.clone()),
            story_path: Some(story.path.clone()),
            ..Self::new(workflow)
        }
    }

    pub fn with_var(mut self, key: impl Into<String>, value: Value) -> Self {
        self.vars.insert(key.into(), value);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub success: bool,
    #[serde(default)]
    pub data: Value,
}

impl StepOutcome {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            data: json!({ "error": reason.into() }),
        }
    }

    /// Best-effort reason for an unsuccessful outcome.
    pub fn failure_reason(&self) -> String {
        self.data
            .get("error")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| "step reported success=false".to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaIssue {
    pub message: String,
    #[serde(default = "default_severity")]
    pub severity: String,
}

fn default_severity() -> String {
    "medium".to_string()
}

impl QaIssue {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: default_severity(),
        }
    }
}

/// Verdict read from a QA step's output data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QaVerdict {
    #[serde(default)]
    pub approved: bool,
    #[serde(default)]
    pub issues: Vec<QaIssue>,
}

impl QaVerdict {
    /// Missing or malformed verdicts count as "not approved".
    pub fn from_data(data: &Value) -> Self {
        match serde_json::from_value::<QaVerdict>(data.clone()) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("unreadable QA verdict, treating as not approved: {e}");
                QaVerdict {
                    approved: false,
                    issues: vec![QaIssue::new(format!("unreadable QA verdict: {e}"))],
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// StepExecutor
// ---------------------------------------------------------------------------

#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute(&self, step: &WorkflowStep, context: &StepContext) -> Result<StepOutcome>;
}

/// Canned agent responses. Dev steps always succeed; QA approves once
/// `context.iteration >= approve_on_iteration`.
#[derive(Debug, Clone)]
pub struct SimulatedExecutor {
    pub approve_on_iteration: u32,
}

impl Default for SimulatedExecutor {
    fn default() -> Self {
        Self {
            approve_on_iteration: 1,
        }
    }
}

#[async_trait]
impl StepExecutor for SimulatedExecutor {
    async fn execute(&self, step: &WorkflowStep, context: &StepContext) -> Result<StepOutcome> {
        let data = match step.kind {
            StepKind::DevImplement | StepKind::DevAddressFeedback => json!({
                "summary": format!("{} completed in iteration {}", step.action, context.iteration),
                "addressed_issues": context.qa_issues.len(),
            }),
            StepKind::QaReview => {
                if context.iteration >= self.approve_on_iteration {
                    json!({ "approved": true, "issues": [] })
                } else {
                    json!({
                        "approved": false,
                        "issues": [{
                            "message": format!("changes requested in iteration {}", context.iteration),
                            "severity": "medium",
                        }],
                    })
                }
            }
            StepKind::Task => json!({ "summary": format!("{} completed", step.label()) }),
        };
        Ok(StepOutcome::ok(data))
    }
}

// ---------------------------------------------------------------------------
// Shell executor
// ---------------------------------------------------------------------------

/// Runs `sh -c <command>` in the project root. The request
/// `{step, context}` is written to stdin as JSON; stdout must contain a
/// `{success, data}` object (the whole output or its last non-empty line).
#[derive(Debug, Clone)]
pub struct ShellStepExecutor {
    pub command: String,
    pub cwd: PathBuf,
    pub timeout: Option<Duration>,
}

impl ShellStepExecutor {
    pub fn new(command: impl Into<String>, cwd: &Path, timeout: Option<Duration>) -> Self {
        Self {
            command: command.into(),
            cwd: cwd.to_path_buf(),
            timeout,
        }
    }

    async fn run(&self, input: Vec<u8>, step: &WorkflowStep, iteration: u32) -> Result<StepOutcome> {
        let mut child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .current_dir(&self.cwd)
            .env("SEMAD_AGENT", step.agent.as_str())
            .env("SEMAD_ACTION", &step.action)
            .env("SEMAD_ITERATION", iteration.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SemadError::StepExecution(format!("failed to spawn: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            // A command that ignores stdin may close it early.
            let _ = stdin.write_all(&input).await;
        }

        let output = child.wait_with_output().await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            return Err(SemadError::StepExecution(format!(
                "command exited with {code}: {}",
                tail(stderr.trim(), 2_000)
            )));
        }
        parse_outcome(&stdout)
    }
}

#[async_trait]
impl StepExecutor for ShellStepExecutor {
    async fn execute(&self, step: &WorkflowStep, context: &StepContext) -> Result<StepOutcome> {
        let input = serde_json::to_vec(&json!({ "step": step, "context": context }))?;
        let fut = self.run(input, step, context.iteration);
        match self.timeout {
            None => fut.await,
            Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
                SemadError::StepExecution(format!("timed out after {}s", limit.as_secs()))
            })?,
        }
    }
}

fn parse_outcome(stdout: &str) -> Result<StepOutcome> {
    let trimmed = stdout.trim();
    if let Ok(outcome) = serde_json::from_str::<StepOutcome>(trimmed) {
        return Ok(outcome);
    }
    let last = trimmed
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or_default();
    serde_json::from_str::<StepOutcome>(last).map_err(|e| {
        SemadError::StepExecution(format!(
            "command output is not a step outcome ({e}): {}",
            tail(trimmed, 500)
        ))
    })
}

fn tail(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

// ---------------------------------------------------------------------------
// Configured executor
// ---------------------------------------------------------------------------

/// Dispatches each step to the backend configured for its agent role.
pub struct ConfiguredExecutor {
    agents: AgentsConfig,
    root: PathBuf,
}

impl ConfiguredExecutor {
    pub fn new(agents: AgentsConfig, root: &Path) -> Self {
        Self {
            agents,
            root: root.to_path_buf(),
        }
    }
}

#[async_trait]
impl StepExecutor for ConfiguredExecutor {
    async fn execute(&self, step: &WorkflowStep, context: &StepContext) -> Result<StepOutcome> {
        match self.agents.backend_for(step.agent) {
            AgentBackend::Simulated {
                approve_on_iteration,
            } => {
                SimulatedExecutor {
                    approve_on_iteration: *approve_on_iteration,
                }
                .execute(step, context)
                .await
            }
            AgentBackend::Shell {
                command,
                timeout_seconds,
            } => {
                ShellStepExecutor::new(
                    command.clone(),
                    &self.root,
                    timeout_seconds.map(Duration::from_secs),
                )
                .execute(step, context)
                .await
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
