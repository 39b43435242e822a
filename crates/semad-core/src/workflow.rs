//! Workflow definitions.
//!
//! A workflow is a named, ordered list of agent steps stored as YAML under
//! `.semad/workflows/<name>.yaml`. Loading resolves every step into a
//! [`StepKind`] up front; unknown agents and dev/qa actions that match no
//! known pattern are rejected at load time.

use crate::error::{Result, SemadError};
use crate::paths;
use crate::types::AgentRole;
use serde::{Deserialize, Deserializer, Serialize};
use std::ops::Range;
use std::path::Path;

// ---------------------------------------------------------------------------
// Definitions (as authored)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub steps: Vec<StepDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepDefinition {
    pub agent: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creates: Option<String>,
    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub requires: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

fn one_or_many<'de, D>(d: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }
    Ok(match OneOrMany::deserialize(d)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}

// ---------------------------------------------------------------------------
// Resolved workflow
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    DevImplement,
    DevAddressFeedback,
    QaReview,
    /// Any non dev/qa agent step; runs once in sequence.
    Task,
}

impl StepKind {
    /// Resolve the kind of an `agent`/`action` pair.
    pub fn resolve(agent: AgentRole, action: &str) -> std::result::Result<Self, String> {
        let action = action.to_ascii_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| action.contains(n));
        match agent {
            AgentRole::Dev if has(&["feedback", "fix", "address"]) => {
                Ok(StepKind::DevAddressFeedback)
            }
            AgentRole::Dev if has(&["implement", "develop"]) => Ok(StepKind::DevImplement),
            AgentRole::Dev => Err(format!(
                "dev action '{action}' is neither an implement nor a feedback action"
            )),
            AgentRole::Qa if has(&["review", "test", "gate"]) => Ok(StepKind::QaReview),
            AgentRole::Qa => Err(format!("qa action '{action}' is not a review action")),
            _ => Ok(StepKind::Task),
        }
    }

    pub fn is_dev_or_qa(self) -> bool {
        !matches!(self, StepKind::Task)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub index: usize,
    pub agent: AgentRole,
    pub action: String,
    pub kind: StepKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creates: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl WorkflowStep {
    pub fn label(&self) -> String {
        format!("{}/{}", self.agent, self.action)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub steps: Vec<WorkflowStep>,
}

/// Where the dev/qa block sits inside a workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevQaLayout {
    pub implement: usize,
    pub feedback: Option<usize>,
    pub review: usize,
    /// Index one past the last step of the contiguous dev/qa block.
    pub block_end: usize,
}

impl DevQaLayout {
    pub fn setup(&self) -> Range<usize> {
        0..self.implement
    }

    pub fn wrap_up(&self, len: usize) -> Range<usize> {
        self.block_end..len
    }
}

impl Workflow {
    pub fn from_definition(def: WorkflowDefinition) -> Result<Self> {
        if def.steps.is_empty() {
            return Err(SemadError::InvalidStep {
                workflow: def.name,
                index: 0,
                reason: "workflow has no steps".to_string(),
            });
        }
        let mut steps = Vec::with_capacity(def.steps.len());
        for (index, step) in def.steps.into_iter().enumerate() {
            let invalid = |reason: String| SemadError::InvalidStep {
                workflow: def.name.clone(),
                index,
                reason,
            };
            let agent: AgentRole = step.agent.parse().map_err(invalid)?;
            let kind = StepKind::resolve(agent, &step.action).map_err(invalid)?;
            steps.push(WorkflowStep {
                index,
                agent,
                action: step.action,
                kind,
                creates: step.creates,
                requires: step.requires,
                condition: step.condition,
            });
        }
        Ok(Self {
            name: def.name,
            description: def.description,
            steps,
        })
    }

    pub fn parse_yaml(yaml: &str) -> Result<Self> {
        let def: WorkflowDefinition = serde_yaml::from_str(yaml)?;
        Self::from_definition(def)
    }

    /// Locate the dev/qa block: the first dev implement step, the first qa
    /// review after it, and the contiguous run of dev/qa steps around them.
    pub fn dev_qa_layout(&self) -> Option<DevQaLayout> {
        let implement = self
            .steps
            .iter()
            .position(|s| s.kind == StepKind::DevImplement)?;
        let review = self.steps[implement..]
            .iter()
            .position(|s| s.kind == StepKind::QaReview)?
            + implement;
        let block_end = self.steps[implement..]
            .iter()
            .position(|s| !s.kind.is_dev_or_qa())
            .map(|p| p + implement)
            .unwrap_or(self.steps.len())
            .max(review + 1);
        let feedback = self.steps[implement..block_end]
            .iter()
            .position(|s| s.kind == StepKind::DevAddressFeedback)
            .map(|p| p + implement);
        Some(DevQaLayout {
            implement,
            feedback,
            review,
            block_end,
        })
    }

    pub fn is_dev_qa_workflow(&self) -> bool {
        self.dev_qa_layout().is_some()
    }
}

// ---------------------------------------------------------------------------
// Built-in workflows
// ---------------------------------------------------------------------------

pub const DEV_QA_CYCLE_YAML: &str = r#"name: dev-qa-cycle
description: Implement an approved story and iterate with QA until approval.
steps:
  - agent: po
    action: validate_story_contract
    requires: story.md
  - agent: dev
    action: implement_story
    requires: story.md
  - agent: qa
    action: review_implementation
  - agent: dev
    action: address_qa_feedback
  - agent: po
    action: accept_story
"#;

pub const STORY_DEV_YAML: &str = r#"name: story-dev
description: Draft the next story, then implement and review it.
steps:
  - agent: sm
    action: create_next_story
    creates: story.md
  - agent: po
    action: validate_story_contract
    requires: story.md
  - agent: dev
    action: implement_story
  - agent: qa
    action: review_implementation
  - agent: dev
    action: address_qa_feedback
"#;

pub const PLANNING_YAML: &str = r#"name: planning
description: Produce the planning documents for a new project.
steps:
  - agent: analyst
    action: create_project_brief
    creates: project-brief.md
  - agent: pm
    action: create_prd
    creates: prd.md
    requires: project-brief.md
  - agent: architect
    action: create_architecture
    creates: architecture.md
    requires: [prd.md]
  - agent: po
    action: shard_documents
    requires: [prd.md, architecture.md]
"#;

/// `(name, yaml)` of the workflows shipped with the binary.
pub fn builtin_workflows() -> &'static [(&'static str, &'static str)] {
    &[
        ("dev-qa-cycle", DEV_QA_CYCLE_YAML),
        ("story-dev", STORY_DEV_YAML),
        ("planning", PLANNING_YAML),
    ]
}

/// Load a workflow by name: `.semad/workflows/<name>.yaml` first, then the
/// built-ins.
pub fn load_workflow(root: &Path, name: &str) -> Result<Workflow> {
    let path = paths::workflow_path(root, name);
    if path.exists() {
        let data = std::fs::read_to_string(&path)?;
        return Workflow::parse_yaml(&data);
    }
    builtin_workflows()
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, yaml)| Workflow::parse_yaml(yaml))
        .unwrap_or_else(|| Err(SemadError::WorkflowNotFound(name.to_string())))
}

/// Names of every workflow available under `root`, built-ins included.
pub fn list_workflows(root: &Path) -> Result<Vec<String>> {
    let mut names: Vec<String> = builtin_workflows()
        .iter()
        .map(|(n, _)| n.to_string())
        .collect();
    let dir = paths::workflows_dir(root);
    if dir.is_dir() {
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "yaml") {
                if let Some(stem) = path.file_stem() {
                    names.push(stem.to_string_lossy().into_owned());
                }
            }
        }
    }
    names.sort();
    names.dedup();
    Ok(names)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
