use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SemadError {
    #[error("not initialized: run 'semad init'")]
    NotInitialized,

    #[error("story not found: {0}")]
    StoryNotFound(PathBuf),

    #[error("invalid story filename '{0}': expected <epic>.<story>.<slug>.md")]
    InvalidStoryFilename(String),

    #[error("Stories directory not found: {0}")]
    StoriesDirMissing(PathBuf),

    #[error("No story files found in {0}")]
    NoStoryFiles(PathBuf),

    #[error("No approved stories found in {0}")]
    NoApprovedStories(PathBuf),

    #[error("No stories found for epic {0}")]
    EpicHasNoStories(String),

    #[error("No approved stories remaining in epic {0}")]
    NoApprovedStoryInEpic(String),

    #[error("invalid story status: {0}")]
    InvalidStatus(String),

    #[error("failed to parse front matter in {origin}: {message}")]
    ContractParse { origin: String, message: String },

    #[error("story '{0}' has no StoryContract in its front matter")]
    MissingContract(String),

    #[error("StoryContract for '{story}' is invalid:\n{details}")]
    InvalidContract { story: String, details: String },

    #[error("workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("invalid step {index} in workflow '{workflow}': {reason}")]
    InvalidStep {
        workflow: String,
        index: usize,
        reason: String,
    },

    #[error("workflow '{0}' does not contain a dev/qa step pair")]
    NotDevQaWorkflow(String),

    #[error("step {agent}/{action} failed after {attempts} attempt(s): {reason}")]
    StepFailed {
        agent: String,
        action: String,
        attempts: u32,
        reason: String,
    },

    #[error("step execution error: {0}")]
    StepExecution(String),

    #[error("invalid flow type '{0}': expected 'linear' or 'iterative'")]
    InvalidFlowType(String),

    #[error("Atomic status update failed for {path}: {reason}")]
    AtomicUpdate { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SemadError>;
