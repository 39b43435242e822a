//! Phase gates.
//!
//! A gate is a checklist evaluated before a phase starts. Every check runs
//! and is reported; the gate passes only when all of them pass.

use crate::config::Config;
use crate::contract::{self, StoryContract};
use crate::story::Story;
use crate::types::StoryStatus;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

// ---------------------------------------------------------------------------
// GateKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateKind {
    Planning,
    Dev,
    Qa,
}

impl GateKind {
    pub fn as_str(self) -> &'static str {
        match self {
            GateKind::Planning => "planning",
            GateKind::Dev => "dev",
            GateKind::Qa => "qa",
        }
    }

    /// Statuses a story may be in when this gate is checked.
    pub fn allowed_statuses(self) -> &'static [StoryStatus] {
        match self {
            GateKind::Planning => &[],
            GateKind::Dev => &[StoryStatus::Approved, StoryStatus::InProgress],
            GateKind::Qa => &[StoryStatus::InProgress, StoryStatus::Review, StoryStatus::Done],
        }
    }
}

impl fmt::Display for GateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// GateReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateCheck {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateReport {
    pub gate: GateKind,
    pub passed: bool,
    pub checks: Vec<GateCheck>,
}

impl GateReport {
    fn new(gate: GateKind) -> Self {
        Self {
            gate,
            passed: true,
            checks: Vec::new(),
        }
    }

    fn check(&mut self, name: &str, passed: bool, detail: impl Into<String>) {
        self.passed &= passed;
        self.checks.push(GateCheck {
            name: name.to_string(),
            passed,
            detail: detail.into(),
        });
    }

    pub fn failed_checks(&self) -> impl Iterator<Item = &GateCheck> {
        self.checks.iter().filter(|c| !c.passed)
    }
}

// ---------------------------------------------------------------------------
// Gates
// ---------------------------------------------------------------------------

/// PRD and architecture documents exist and are non-empty.
pub fn check_planning_gate(root: &Path, config: &Config) -> GateReport {
    let mut report = GateReport::new(GateKind::Planning);
    for (name, rel) in [("prd", &config.docs.prd), ("architecture", &config.docs.architecture)] {
        let path = root.join(rel);
        match std::fs::read_to_string(&path) {
            Ok(text) if !text.trim().is_empty() => {
                report.check(name, true, path.display().to_string())
            }
            Ok(_) => report.check(name, false, format!("{} is empty", path.display())),
            Err(_) => report.check(name, false, format!("{} not found", path.display())),
        }
    }
    report
}

/// Story has a valid StoryContract and is ready for development.
pub fn check_dev_gate(story_path: &Path) -> GateReport {
    check_story_gate(GateKind::Dev, story_path)
}

/// Story has a valid StoryContract and has been worked on.
pub fn check_qa_gate(story_path: &Path) -> GateReport {
    check_story_gate(GateKind::Qa, story_path)
}

fn check_story_gate(gate: GateKind, story_path: &Path) -> GateReport {
    let mut report = GateReport::new(gate);
    let story = match Story::load(story_path) {
        Ok(story) => {
            report.check("story", true, story.story_id.clone());
            story
        }
        Err(e) => {
            report.check("story", false, e.to_string());
            return report;
        }
    };

    match &story.contract {
        None => report.check("contract", false, "no StoryContract in front matter"),
        Some(value) => {
            let validation = contract::validate(value);
            if validation.valid {
                let detail = StoryContract::from_value(&story.story_id, value)
                    .map(|c| {
                        format!(
                            "{} endpoint(s), {} file(s)",
                            c.api_endpoints.len(),
                            c.files_to_modify.len()
                        )
                    })
                    .unwrap_or_else(|e| e.to_string());
                report.check("contract", true, detail);
            } else {
                report.check("contract", false, contract::format_errors(&validation.errors));
            }
        }
    }

    let allowed = gate.allowed_statuses();
    let detail = if allowed.contains(&story.status) {
        story.status.to_string()
    } else {
        let names: Vec<_> = allowed.iter().map(|s| s.as_str()).collect();
        format!("status is {}, expected one of {}", story.status, names.join(", "))
    };
    report.check("status", allowed.contains(&story.status), detail);
    report
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
