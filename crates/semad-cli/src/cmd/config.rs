use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use semad_core::config::{AgentBackend, Config, WarnLevel};
use semad_core::types::AgentRole;
use std::path::Path;

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show workflow settings and agent backends
    Show,
    /// Validate the config for common mistakes
    Validate,
}

pub fn run(root: &Path, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Show => show(root, json),
        ConfigSubcommand::Validate => validate(root, json),
    }
}

fn show(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    if json {
        return print_json(&config);
    }

    let wf = &config.workflow;
    println!("Project:          {}", config.project.name);
    println!("Stories:          {}", config.stories_dir.display());
    println!("Workflow:         {} ({})", wf.default_workflow, wf.flow_type);
    println!("Max iterations:   {}", wf.max_iterations);
    println!("Max step retries: {}", wf.max_step_retries);
    println!("Require contract: {}", wf.require_contract);
    println!("Agents:");
    for role in AgentRole::all() {
        println!(
            "  {:<12} {}",
            role.as_str(),
            backend_display(config.agents.backend_for(*role))
        );
    }
    Ok(())
}

fn backend_display(backend: &AgentBackend) -> String {
    match backend {
        AgentBackend::Simulated {
            approve_on_iteration,
        } => format!("simulated (qa approves on iteration {approve_on_iteration})"),
        AgentBackend::Shell {
            command,
            timeout_seconds,
        } => {
            let timeout = timeout_seconds
                .map(|t| format!(", timeout: {t}s"))
                .unwrap_or_default();
            format!("shell ({command}{timeout})")
        }
    }
}

fn validate(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let warnings = config.validate();

    if json {
        print_json(&serde_json::json!({ "warnings": warnings }))?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}
