use crate::error::{Result, SemadError};
use crate::paths;
use crate::types::{AgentRole, FlowType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// WorkflowSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSettings {
    #[serde(default = "default_workflow_name")]
    pub default_workflow: String,
    #[serde(default)]
    pub flow_type: FlowType,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Retries after the first attempt when a dev or qa step fails.
    /// `0` means one attempt, `2` means up to three attempts.
    #[serde(default = "default_max_step_retries")]
    pub max_step_retries: u32,
    /// Refuse to start a story whose StoryContract is missing or invalid.
    #[serde(default = "default_require_contract")]
    pub require_contract: bool,
}

fn default_workflow_name() -> String {
    "dev-qa-cycle".to_string()
}

fn default_max_iterations() -> u32 {
    3
}

fn default_max_step_retries() -> u32 {
    2
}

fn default_require_contract() -> bool {
    true
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            default_workflow: default_workflow_name(),
            flow_type: FlowType::default(),
            max_iterations: default_max_iterations(),
            max_step_retries: default_max_step_retries(),
            require_contract: default_require_contract(),
        }
    }
}

// ---------------------------------------------------------------------------
// AgentBackend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentBackend {
    /// Canned responses. QA approves once the iteration reaches
    /// `approve_on_iteration`.
    Simulated {
        #[serde(default = "default_approve_on_iteration")]
        approve_on_iteration: u32,
    },
    /// Run a shell command; the step and context are written to stdin as
    /// JSON and a `{success, data}` object is read back from stdout.
    Shell {
        command: String,
        #[serde(default)]
        timeout_seconds: Option<u64>,
    },
}

fn default_approve_on_iteration() -> u32 {
    1
}

fn default_agent_backend() -> AgentBackend {
    AgentBackend::Simulated {
        approve_on_iteration: default_approve_on_iteration(),
    }
}

// ---------------------------------------------------------------------------
// AgentsConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentsConfig {
    #[serde(default = "default_agent_backend")]
    pub default: AgentBackend,
    #[serde(default)]
    pub roles: HashMap<String, AgentBackend>,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            default: default_agent_backend(),
            roles: HashMap::new(),
        }
    }
}

impl AgentsConfig {
    pub fn backend_for(&self, role: AgentRole) -> &AgentBackend {
        self.roles.get(role.as_str()).unwrap_or(&self.default)
    }
}

// ---------------------------------------------------------------------------
// DocsConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocsConfig {
    #[serde(default = "default_prd")]
    pub prd: PathBuf,
    #[serde(default = "default_architecture")]
    pub architecture: PathBuf,
}

fn default_prd() -> PathBuf {
    PathBuf::from(paths::DEFAULT_PRD)
}

fn default_architecture() -> PathBuf {
    PathBuf::from(paths::DEFAULT_ARCHITECTURE)
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            prd: default_prd(),
            architecture: default_architecture(),
        }
    }
}

// ---------------------------------------------------------------------------
// ProjectConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    pub project: ProjectConfig,
    #[serde(default = "default_stories_dir")]
    pub stories_dir: PathBuf,
    #[serde(default)]
    pub docs: DocsConfig,
    #[serde(default)]
    pub workflow: WorkflowSettings,
    #[serde(default)]
    pub agents: AgentsConfig,
}

fn default_version() -> u32 {
    1
}

fn default_stories_dir() -> PathBuf {
    PathBuf::from(paths::DEFAULT_STORIES_DIR)
}

impl Config {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            version: 1,
            project: ProjectConfig {
                name: project_name.into(),
                description: None,
            },
            stories_dir: default_stories_dir(),
            docs: DocsConfig::default(),
            workflow: WorkflowSettings::default(),
            agents: AgentsConfig::default(),
        }
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(SemadError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    /// Stories directory resolved against the project root.
    pub fn stories_path(&self, root: &Path) -> PathBuf {
        root.join(&self.stories_dir)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.workflow.max_iterations == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "workflow.max_iterations must be at least 1".to_string(),
            });
        } else if self.workflow.max_iterations > 10 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "workflow.max_iterations={} (>10 is unusual)",
                    self.workflow.max_iterations
                ),
            });
        }

        if self.workflow.max_step_retries > 10 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "workflow.max_step_retries={} (>10 is unusual)",
                    self.workflow.max_step_retries
                ),
            });
        }

        for role_key in self.agents.roles.keys() {
            if role_key.parse::<AgentRole>().is_err() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("unknown agent role '{role_key}' in agents.roles"),
                });
            }
        }

        let backends = std::iter::once(&self.agents.default).chain(self.agents.roles.values());
        for backend in backends {
            if let AgentBackend::Shell { command, .. } = backend {
                if command.trim().is_empty() {
                    warnings.push(ConfigWarning {
                        level: WarnLevel::Error,
                        message: "shell agent backend has an empty command".to_string(),
                    });
                }
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
