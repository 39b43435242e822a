use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// StoryStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StoryStatus {
    Draft,
    Approved,
    InProgress,
    Review,
    Done,
    Unknown,
}

impl StoryStatus {
    pub fn all() -> &'static [StoryStatus] {
        &[
            StoryStatus::Draft,
            StoryStatus::Approved,
            StoryStatus::InProgress,
            StoryStatus::Review,
            StoryStatus::Done,
            StoryStatus::Unknown,
        ]
    }

    /// The word written under `## Status` in a story document.
    pub fn as_str(self) -> &'static str {
        match self {
            StoryStatus::Draft => "Draft",
            StoryStatus::Approved => "Approved",
            StoryStatus::InProgress => "InProgress",
            StoryStatus::Review => "Review",
            StoryStatus::Done => "Done",
            StoryStatus::Unknown => "Unknown",
        }
    }

    /// Lenient parse of a status line as authored by humans and agents.
    /// Anything unrecognised maps to `Unknown`.
    pub fn parse_lenient(s: &str) -> StoryStatus {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "draft" => StoryStatus::Draft,
            "approved" => StoryStatus::Approved,
            "inprogress" => StoryStatus::InProgress,
            "review" | "readyforreview" => StoryStatus::Review,
            "done" | "completed" | "complete" => StoryStatus::Done,
            _ => StoryStatus::Unknown,
        }
    }
}

impl fmt::Display for StoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StoryStatus {
    type Err = crate::error::SemadError;

    /// Strict parse used for explicit status updates: `Unknown` is never a
    /// valid target.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match StoryStatus::parse_lenient(s) {
            StoryStatus::Unknown => Err(crate::error::SemadError::InvalidStatus(s.to_string())),
            status => Ok(status),
        }
    }
}

// ---------------------------------------------------------------------------
// AgentRole
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Analyst,
    Pm,
    Architect,
    UxExpert,
    Po,
    Sm,
    Dev,
    Qa,
}

impl AgentRole {
    pub fn all() -> &'static [AgentRole] {
        &[
            AgentRole::Analyst,
            AgentRole::Pm,
            AgentRole::Architect,
            AgentRole::UxExpert,
            AgentRole::Po,
            AgentRole::Sm,
            AgentRole::Dev,
            AgentRole::Qa,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AgentRole::Analyst => "analyst",
            AgentRole::Pm => "pm",
            AgentRole::Architect => "architect",
            AgentRole::UxExpert => "ux_expert",
            AgentRole::Po => "po",
            AgentRole::Sm => "sm",
            AgentRole::Dev => "dev",
            AgentRole::Qa => "qa",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AgentRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "analyst" => Ok(AgentRole::Analyst),
            "pm" => Ok(AgentRole::Pm),
            "architect" => Ok(AgentRole::Architect),
            "ux_expert" => Ok(AgentRole::UxExpert),
            "po" => Ok(AgentRole::Po),
            "sm" => Ok(AgentRole::Sm),
            "dev" => Ok(AgentRole::Dev),
            "qa" => Ok(AgentRole::Qa),
            other => Err(format!("unknown agent '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// FlowType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowType {
    /// Dev and QA run once each, no feedback loop.
    Linear,
    /// Dev and QA alternate until approval or the iteration cap.
    #[default]
    Iterative,
}

impl FlowType {
    pub fn as_str(self) -> &'static str {
        match self {
            FlowType::Linear => "linear",
            FlowType::Iterative => "iterative",
        }
    }
}

impl fmt::Display for FlowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FlowType {
    type Err = crate::error::SemadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linear" => Ok(FlowType::Linear),
            "iterative" => Ok(FlowType::Iterative),
            _ => Err(crate::error::SemadError::InvalidFlowType(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn status_lenient_parse() {
        assert_eq!(StoryStatus::parse_lenient("Approved"), StoryStatus::Approved);
        assert_eq!(StoryStatus::parse_lenient(" in progress "), StoryStatus::InProgress);
        assert_eq!(StoryStatus::parse_lenient("In_Progress"), StoryStatus::InProgress);
        assert_eq!(StoryStatus::parse_lenient("Completed"), StoryStatus::Done);
        assert_eq!(StoryStatus::parse_lenient("Ready for Review"), StoryStatus::Review);
        assert_eq!(StoryStatus::parse_lenient("Blocked?"), StoryStatus::Unknown);
    }

    #[test]
    fn status_strict_parse_rejects_unknown() {
        assert!(StoryStatus::from_str("Unknown").is_err());
        assert!(StoryStatus::from_str("shipped").is_err());
        assert_eq!(StoryStatus::from_str("done").unwrap(), StoryStatus::Done);
    }

    #[test]
    fn status_words_parse_back() {
        for status in StoryStatus::all() {
            assert_eq!(StoryStatus::parse_lenient(status.as_str()), *status);
        }
    }

    #[test]
    fn agent_role_parse() {
        assert_eq!(AgentRole::from_str("QA").unwrap(), AgentRole::Qa);
        assert_eq!(AgentRole::from_str("ux-expert").unwrap(), AgentRole::UxExpert);
        assert!(AgentRole::from_str("wizard").is_err());
        assert_eq!(AgentRole::all().len(), 8);
    }

    #[test]
    fn flow_type_parse() {
        assert_eq!(FlowType::from_str("linear").unwrap(), FlowType::Linear);
        assert_eq!(FlowType::default(), FlowType::Iterative);
        assert!(FlowType::from_str("parallel").is_err());
    }
}
